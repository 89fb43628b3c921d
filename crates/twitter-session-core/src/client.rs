//! ============================================================================
//! TwitterSession - public entry point
//! ============================================================================
//! Wires the credential store, the OAuth transport, the session state
//! machine and the callback dispatcher together:
//! - construction restores a stored credential (auto-login) or settles at
//!   Disconnected
//! - `login` runs a handshake through a caller-supplied web navigator
//! - `logout` / `cancel_login` always end at Disconnected
//!
//! Must be created inside a tokio runtime; all network calls run on tasks
//! spawned onto it.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::db::{CredentialDb, CredentialStore};
use crate::dispatcher::{CallbackDispatcher, SessionObserver};
use crate::error::AuthError;
use crate::handshake::{HandshakeController, HandshakeEvent};
use crate::navigator::WebNavigator;
use crate::session::{auto_login, SessionMachine};
use crate::transport::{OAuthTransport, TwitterTransport};
use crate::types::{Session, SessionState, Tweet};

pub struct TwitterSession {
    machine: Arc<SessionMachine>,
    transport: Arc<dyn OAuthTransport>,
    store: Arc<dyn CredentialStore>,
    runtime: Handle,
    handshake: Mutex<Option<HandshakeController>>,
}

impl TwitterSession {
    /// Build a session and immediately restore any stored credential.
    ///
    /// Fails only when called outside a tokio runtime.
    pub fn new(
        transport: Arc<dyn OAuthTransport>,
        store: Arc<dyn CredentialStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| anyhow!("TwitterSession must be created inside a tokio runtime: {}", e))?;

        let dispatcher = CallbackDispatcher::spawn(&runtime, observer);
        let machine = Arc::new(SessionMachine::new(Arc::clone(&store), dispatcher));

        let session = Self {
            machine,
            transport,
            store,
            runtime,
            handshake: Mutex::new(None),
        };
        session.restore();
        Ok(session)
    }

    /// Live Twitter transport and the on-disk credential store
    pub fn from_config(config: &SessionConfig, observer: Arc<dyn SessionObserver>) -> Result<Self> {
        let transport = Arc::new(TwitterTransport::new(config)?);
        let store = Arc::new(CredentialDb::open(config.db_path.as_deref())?);
        Self::new(transport, store, observer)
    }

    fn restore(&self) {
        match self.store.load() {
            Ok(Some(credential)) => {
                auto_login::start(
                    &self.machine,
                    Arc::clone(&self.transport),
                    credential,
                    &self.runtime,
                );
            }
            Ok(None) => {
                info!("No stored credential");
                self.machine.disconnect();
            }
            Err(e) => {
                warn!("Failed to read credential store: {}", e);
                self.machine.disconnect();
            }
        }
    }

    fn handshake_slot(&self) -> MutexGuard<'_, Option<HandshakeController>> {
        self.handshake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an interactive login through `navigator`.
    ///
    /// Returns false without touching the navigator when a login is
    /// already in progress.
    pub fn login(&self, navigator: Arc<dyn WebNavigator>) -> bool {
        if !self.machine.request_connecting() {
            info!("Login ignored, session is {}", self.machine.current_state().kind());
            return false;
        }

        let machine = Arc::clone(&self.machine);
        let listener = move |event: HandshakeEvent| match event {
            HandshakeEvent::Completed(credential) if !credential.is_valid() => {
                warn!("Token exchange returned an unusable credential: {:?}", credential);
                machine.fail_login(AuthError::other("token exchange returned an invalid credential"));
            }
            HandshakeEvent::Completed(credential) => {
                machine.complete_connected(Session::from_handshake(credential));
            }
            HandshakeEvent::Denied => {
                machine.disconnect();
            }
            HandshakeEvent::Failed(error) => {
                machine.fail_login(error);
            }
        };

        let controller = HandshakeController::new(
            Arc::clone(&self.transport),
            navigator,
            self.runtime.clone(),
            Arc::new(listener),
        );
        controller.start();

        if let Some(previous) = self.handshake_slot().replace(controller) {
            previous.cancel();
        }
        true
    }

    /// Abort an interactive login. Treated as a logout.
    pub fn cancel_login(&self) -> bool {
        if let Some(controller) = self.handshake_slot().take() {
            controller.cancel();
        }
        self.machine.disconnect()
    }

    /// Drop the session and erase the stored credential
    pub fn logout(&self) -> bool {
        if let Some(controller) = self.handshake_slot().take() {
            if controller.cancel() {
                debug!("Logout cancelled a pending handshake");
            }
        }
        self.machine.disconnect()
    }

    pub fn is_logged(&self) -> bool {
        self.machine.is_logged()
    }

    pub fn current_state(&self) -> SessionState {
        self.machine.current_state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.machine.subscribe()
    }

    /// Wait for a state matching `predicate`; returns immediately if the
    /// current state already matches.
    pub async fn wait_until(&self, predicate: impl Fn(&SessionState) -> bool) -> SessionState {
        let mut rx = self.machine.subscribe();
        let matched = rx.wait_for(|state| predicate(state)).await.map(|s| s.clone());
        matched.unwrap_or_else(|_| self.machine.current_state())
    }

    /// Wait for startup or the running login to produce an outcome
    pub async fn wait_settled(&self) -> SessionState {
        self.wait_until(SessionState::is_settled).await
    }

    /// Wait until the observer has seen every accepted transition so far
    pub async fn flush_notifications(&self) {
        self.machine.flush_notifications().await
    }

    /// Most recent tweets of the logged-in user; None when not logged in
    pub async fn load_timeline(&self, count: u32) -> Result<Option<Vec<Tweet>>, AuthError> {
        let Some(session) = self.machine.current_state().session().cloned() else {
            debug!("Timeline requested while not logged in");
            return Ok(None);
        };

        let credential = session.credential();
        let transport = Arc::clone(&self.transport);
        let task = self
            .runtime
            .spawn(async move { transport.fetch_user_timeline(&credential, count).await });

        match task.await {
            Ok(result) => result.map(Some).map_err(AuthError::from),
            Err(e) => Err(AuthError::other(format!("timeline task failed: {}", e))),
        }
    }
}

impl Drop for TwitterSession {
    fn drop(&mut self) {
        if let Some(controller) = self.handshake_slot().take() {
            controller.cancel();
        }
    }
}
