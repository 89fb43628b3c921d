//! ============================================================================
//! OAuth Handshake Controller - the browser-mediated three-legged flow
//! ============================================================================
//! Phases:
//!   Initializing -> AwaitingRedirect -> ExchangingToken -> Completed
//!                                    \-> Denied          \-> Failed
//!   Initializing -> Failed (request token could not be obtained)
//!   AwaitingRedirect -> Failed (navigator stopped before any redirect)
//!   any non-terminal phase -> Cancelled (explicit user cancel)
//!
//! Network calls run on spawned tasks. Navigator callbacks are answered
//! synchronously. The controller never touches the credential store; its
//! outcome is reported once through a `HandshakeListener`.
//! ============================================================================

pub mod redirect;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::navigator::{NavigationDecision, NavigationHandler, NavigationSink, WebNavigator};
use crate::transport::OAuthTransport;
use crate::types::{redact, Credential, RequestToken};
use redirect::Redirect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Initializing,
    AwaitingRedirect,
    ExchangingToken,
    Completed,
    Denied,
    Failed,
    Cancelled,
}

impl HandshakePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Denied | Self::Failed | Self::Cancelled
        )
    }
}

/// Terminal outcome of a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Access granted and exchanged for a credential
    Completed(Credential),
    /// The user refused access on the authorization page
    Denied,
    /// Request token or token exchange failed
    Failed(AuthError),
}

pub trait HandshakeListener: Send + Sync {
    fn on_handshake_event(&self, event: HandshakeEvent);
}

impl<F> HandshakeListener for F
where
    F: Fn(HandshakeEvent) + Send + Sync,
{
    fn on_handshake_event(&self, event: HandshakeEvent) {
        self(event)
    }
}

struct Flow {
    phase: HandshakePhase,
    started: bool,
    request_token: Option<RequestToken>,
    auth_host: Option<String>,
    listener: Option<Arc<dyn HandshakeListener>>,
}

struct Inner {
    transport: Arc<dyn OAuthTransport>,
    navigator: Arc<dyn WebNavigator>,
    runtime: Handle,
    flow: Mutex<Flow>,
}

/// Drives one handshake attempt. Create a new controller per login.
pub struct HandshakeController {
    inner: Arc<Inner>,
}

impl HandshakeController {
    pub fn new(
        transport: Arc<dyn OAuthTransport>,
        navigator: Arc<dyn WebNavigator>,
        runtime: Handle,
        listener: Arc<dyn HandshakeListener>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                navigator,
                runtime,
                flow: Mutex::new(Flow {
                    phase: HandshakePhase::Initializing,
                    started: false,
                    request_token: None,
                    auth_host: None,
                    listener: Some(listener),
                }),
            }),
        }
    }

    /// Fetch the request token in the background and hand the authorization
    /// URL to the navigator. Returns false if already started.
    pub fn start(&self) -> bool {
        {
            let mut flow = self.inner.lock();
            if flow.started || flow.phase != HandshakePhase::Initializing {
                warn!("Handshake already started (phase {:?})", flow.phase);
                return false;
            }
            flow.started = true;
        }

        info!("Starting OAuth handshake");
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(inner.request_authorization());
        true
    }

    /// Abandon the flow. The listener is detached first, so a network call
    /// still in flight can no longer report anything.
    pub fn cancel(&self) -> bool {
        let mut flow = self.inner.lock();
        if flow.phase.is_terminal() {
            debug!("Handshake already finished ({:?}), nothing to cancel", flow.phase);
            return false;
        }
        info!("Handshake cancelled during {:?}", flow.phase);
        flow.listener = None;
        flow.phase = HandshakePhase::Cancelled;
        true
    }

    pub fn phase(&self) -> HandshakePhase {
        self.inner.lock().phase
    }

    /// Host of the authorization page, known once the request token arrived
    pub fn authorization_host(&self) -> Option<String> {
        self.inner.lock().auth_host.clone()
    }

    /// Sink feeding navigator events into this controller
    pub fn sink(&self) -> NavigationSink {
        self.inner.sink()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Flow> {
        self.flow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(self: &Arc<Self>) -> NavigationSink {
        let handler: Weak<dyn NavigationHandler> = Arc::downgrade(self) as Weak<dyn NavigationHandler>;
        NavigationSink::new(handler)
    }

    async fn request_authorization(self: Arc<Self>) {
        let token = match self.transport.get_request_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to obtain request token: {}", e);
                self.finish(
                    HandshakePhase::Initializing,
                    HandshakePhase::Failed,
                    HandshakeEvent::Failed(e.into()),
                );
                return;
            }
        };

        let Some(host) = redirect::host_of(&token.authorization_url) else {
            warn!("Authorization URL has no host: {}", token.authorization_url);
            self.finish(
                HandshakePhase::Initializing,
                HandshakePhase::Failed,
                HandshakeEvent::Failed(AuthError::other(format!(
                    "invalid authorization URL: {}",
                    token.authorization_url
                ))),
            );
            return;
        };

        let url = token.authorization_url.clone();
        {
            let mut flow = self.lock();
            if flow.phase != HandshakePhase::Initializing {
                debug!("Request token arrived after {:?}, ignoring", flow.phase);
                return;
            }
            debug!("Authorization host: {}", host);
            flow.auth_host = Some(host);
            flow.request_token = Some(token);
            flow.phase = HandshakePhase::AwaitingRedirect;
        }

        info!("Loading authorization page");
        self.navigator.load(&url, self.sink());
    }

    async fn exchange(self: Arc<Self>, request_token: RequestToken, verifier: String) {
        let result = self.transport.get_access_token(&request_token, &verifier).await;
        match result {
            Ok(credential) => {
                info!("Token exchange succeeded for user {}", credential.user_id);
                self.finish(
                    HandshakePhase::ExchangingToken,
                    HandshakePhase::Completed,
                    HandshakeEvent::Completed(credential),
                );
            }
            Err(e) => {
                warn!("Token exchange failed: {}", e);
                self.finish(
                    HandshakePhase::ExchangingToken,
                    HandshakePhase::Failed,
                    HandshakeEvent::Failed(e.into()),
                );
            }
        }
    }

    /// Move `expected -> terminal` and report `event`, unless the flow has
    /// moved on (cancelled) in the meantime.
    fn finish(&self, expected: HandshakePhase, terminal: HandshakePhase, event: HandshakeEvent) {
        let listener = {
            let mut flow = self.lock();
            if flow.phase != expected {
                debug!(
                    "Dropping {:?} outcome, flow is {:?}",
                    terminal, flow.phase
                );
                return;
            }
            flow.phase = terminal;
            flow.listener.take()
        };

        info!("Handshake finished: {:?}", terminal);
        self.navigator.dismiss();
        if let Some(listener) = listener {
            listener.on_handshake_event(event);
        }
    }
}

impl NavigationHandler for Inner {
    fn on_navigation(self: Arc<Self>, url: &str) -> NavigationDecision {
        debug!("Navigation attempt: {}", url);

        let mut flow = self.lock();
        if flow.phase != HandshakePhase::AwaitingRedirect {
            return NavigationDecision::Proceed;
        }
        let Some(auth_host) = flow.auth_host.as_deref() else {
            return NavigationDecision::Proceed;
        };

        match redirect::classify(url, auth_host) {
            Redirect::Passthrough => NavigationDecision::Proceed,
            Redirect::Denied => {
                drop(flow);
                info!("Authorization denied by user");
                self.finish(
                    HandshakePhase::AwaitingRedirect,
                    HandshakePhase::Denied,
                    HandshakeEvent::Denied,
                );
                NavigationDecision::Handled
            }
            Redirect::Granted { token, verifier } => {
                let Some(issued) = flow.request_token.as_ref() else {
                    return NavigationDecision::Proceed;
                };
                if issued.token != token {
                    warn!(
                        "Redirect token {} differs from issued {}",
                        redact(&token),
                        redact(&issued.token)
                    );
                }
                let request_token = RequestToken {
                    token,
                    secret: issued.secret.clone(),
                    authorization_url: issued.authorization_url.clone(),
                };
                flow.phase = HandshakePhase::ExchangingToken;
                drop(flow);

                info!("Authorization granted, exchanging token {}", redact(&request_token.token));
                let inner = Arc::clone(&self);
                self.runtime.spawn(inner.exchange(request_token, verifier));
                NavigationDecision::Handled
            }
        }
    }

    fn on_load_error(&self, url: &str, code: i32, description: &str) {
        warn!("Authorization page failed to load: {} (code {}: {})", url, code, description);
    }

    fn on_abort(&self, url: &str, code: i32, description: &str) {
        warn!("Navigator stopped: {} (code {}: {})", url, code, description);
        self.finish(
            HandshakePhase::AwaitingRedirect,
            HandshakePhase::Failed,
            HandshakeEvent::Failed(AuthError::Network {
                message: description.to_string(),
                transient: false,
            }),
        );
    }
}
