//! Fakes shared by the in-crate tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::db::{CredentialDb, CredentialStore};
use crate::dispatcher::SessionObserver;
use crate::error::{PersistenceError, TransportError};
use crate::navigator::{NavigationDecision, NavigationSink, WebNavigator};
use crate::transport::OAuthTransport;
use crate::types::{Credential, RequestToken, SessionState, SessionStateKind, Tweet};

/// Holds a fake network call until opened
#[derive(Default)]
pub(crate) struct Gate {
    closed: AtomicBool,
    opened: Notify,
    passed: Notify,
}

impl Gate {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.opened.notify_one();
    }

    async fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            self.opened.notified().await;
        }
        self.passed.notify_one();
    }

    /// Resolves once a call went through the gate
    pub async fn wait_passed(&self) {
        self.passed.notified().await;
    }
}

/// Scripted OAuth transport recording every call
pub(crate) struct FakeTransport {
    request_token: Result<RequestToken, TransportError>,
    access_token: Result<Credential, TransportError>,
    screen_name: Result<String, TransportError>,
    timeline: Result<Vec<Tweet>, TransportError>,
    exchanges: Mutex<Vec<(RequestToken, String)>>,
    verified: Mutex<Vec<Credential>>,
    pub exchange_gate: Gate,
    pub screen_name_gate: Gate,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            request_token: Ok(RequestToken {
                token: "REQ".into(),
                secret: "REQ_SECRET".into(),
                authorization_url: "https://api.example.com/oauth/authorize?oauth_token=REQ".into(),
            }),
            access_token: Ok(Credential::new("X", "X_SECRET", 42, "alice")),
            screen_name: Ok("alice".into()),
            timeline: Ok(Vec::new()),
            exchanges: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
            exchange_gate: Gate::default(),
            screen_name_gate: Gate::default(),
        }
    }

    pub fn request_token(mut self, result: Result<RequestToken, TransportError>) -> Self {
        self.request_token = result;
        self
    }

    pub fn access_token(mut self, result: Result<Credential, TransportError>) -> Self {
        self.access_token = result;
        self
    }

    pub fn screen_name(mut self, result: Result<String, TransportError>) -> Self {
        self.screen_name = result;
        self
    }

    pub fn timeline(mut self, result: Result<Vec<Tweet>, TransportError>) -> Self {
        self.timeline = result;
        self
    }

    /// (request token, verifier) pairs passed to the exchange
    pub fn exchanges(&self) -> Vec<(RequestToken, String)> {
        self.exchanges.lock().unwrap().clone()
    }

    /// Credentials passed to screen-name fetches
    pub fn verified(&self) -> Vec<Credential> {
        self.verified.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthTransport for FakeTransport {
    async fn get_request_token(&self) -> Result<RequestToken, TransportError> {
        self.request_token.clone()
    }

    async fn get_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<Credential, TransportError> {
        self.exchanges
            .lock()
            .unwrap()
            .push((request_token.clone(), verifier.to_string()));
        self.exchange_gate.pass().await;
        self.access_token.clone()
    }

    async fn fetch_screen_name(&self, credential: &Credential) -> Result<String, TransportError> {
        self.verified.lock().unwrap().push(credential.clone());
        self.screen_name_gate.pass().await;
        self.screen_name.clone()
    }

    async fn fetch_user_timeline(
        &self,
        _credential: &Credential,
        count: u32,
    ) -> Result<Vec<Tweet>, TransportError> {
        self.timeline
            .clone()
            .map(|tweets| tweets.into_iter().take(count as usize).collect())
    }
}

/// Navigator that only remembers what it was asked to do
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    loaded: Mutex<Vec<String>>,
    sink: Mutex<Option<NavigationSink>>,
    dismissed: AtomicUsize,
    loaded_signal: Notify,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }

    /// Wait for the authorization page to be loaded; returns its sink
    pub async fn wait_loaded(&self) -> NavigationSink {
        loop {
            let notified = self.loaded_signal.notified();
            if let Some(sink) = self.sink.lock().unwrap().clone() {
                return sink;
            }
            notified.await;
        }
    }

    /// Simulate the browser navigating to `url`
    pub async fn navigate(&self, url: &str) -> NavigationDecision {
        self.wait_loaded().await.on_navigation(url)
    }
}

impl WebNavigator for RecordingNavigator {
    fn load(&self, url: &str, sink: NavigationSink) {
        self.loaded.lock().unwrap().push(url.to_string());
        *self.sink.lock().unwrap() = Some(sink);
        self.loaded_signal.notify_waiters();
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observer collecting every delivered state
#[derive(Default)]
pub(crate) struct RecordingObserver {
    states: Mutex<Vec<SessionState>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<SessionStateKind> {
        self.states().iter().map(SessionState::kind).collect()
    }

    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().unwrap().push(state.clone());
    }
}

/// Store error as redb reports a failing disk
pub(crate) fn store_failure(message: &str) -> PersistenceError {
    PersistenceError::Storage {
        context: "Failed to write credential",
        source: redb::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string())),
    }
}

/// In-memory credential store whose writes can be made to fail
pub(crate) struct FlakyStore {
    inner: CredentialDb,
    fail_saves: AtomicBool,
    fail_clears: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: CredentialDb::open_in_memory().unwrap(),
            fail_saves: AtomicBool::new(false),
            fail_clears: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        })
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for FlakyStore {
    fn save(&self, credential: &Credential) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(store_failure("disk full"));
        }
        self.inner.save(credential)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<Credential>, PersistenceError> {
        self.inner.load()
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(store_failure("read-only filesystem"));
        }
        self.inner.clear()
    }
}
