//! ============================================================================
//! Session State Machine
//! ============================================================================
//! Holds the single current `SessionState` and is the only writer of the
//! credential store while transitioning.
//!
//! Every request runs inside one exclusive section (the watch channel's
//! write lock): read the old state, check the transition table, persist,
//! replace the state and queue the notification. A rejected request changes
//! nothing and notifies nobody.
//!
//! | old \ requested | Connecting | Connected | Disconnected | LoginFailed |
//! |-----------------|------------|-----------|--------------|-------------|
//! | Invalid         | accept     | reject    | accept       | reject      |
//! | Disconnected    | accept     | reject    | reject       | reject      |
//! | Connecting      | reject     | accept    | accept       | accept      |
//! | Connected       | accept     | reject    | accept       | reject      |
//! | LoginFailed     | accept     | reject    | accept       | reject      |
//! ============================================================================

pub(crate) mod auto_login;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::CredentialStore;
use crate::dispatcher::CallbackDispatcher;
use crate::error::{AuthError, InvalidTransition, PersistenceError};
use crate::types::{Session, SessionState, SessionStateKind};

/// Transition table lookup
pub fn transition_allowed(from: SessionStateKind, to: SessionStateKind) -> bool {
    use SessionStateKind::*;
    match to {
        Connecting | Disconnected => from != to,
        Connected | LoginFailed => from == Connecting,
        Invalid => false,
    }
}

pub struct SessionMachine {
    state: watch::Sender<SessionState>,
    store: Arc<dyn CredentialStore>,
    dispatcher: CallbackDispatcher,
}

impl SessionMachine {
    pub fn new(store: Arc<dyn CredentialStore>, dispatcher: CallbackDispatcher) -> Self {
        let (state, _) = watch::channel(SessionState::Invalid);
        Self {
            state,
            store,
            dispatcher,
        }
    }

    /// Move to Connecting. Storage is not touched.
    pub fn request_connecting(&self) -> bool {
        self.transition(SessionState::Connecting)
    }

    /// Move to Connected and persist the session's credential.
    ///
    /// Sessions accepted from cached data are not re-saved. If the write
    /// fails, the request is rejected and the machine lands in LoginFailed
    /// instead, so it never stays in Connecting.
    pub fn complete_connected(&self, session: Session) -> bool {
        self.transition(SessionState::Connected { session })
    }

    /// Move to Disconnected and erase the stored credential.
    ///
    /// A failed erase rejects the request, except from Connecting where the
    /// machine lands in LoginFailed instead.
    pub fn disconnect(&self) -> bool {
        self.transition(SessionState::Disconnected)
    }

    /// Move to LoginFailed and erase the stored credential
    pub fn fail_login(&self, error: AuthError) -> bool {
        self.transition(SessionState::LoginFailed { error })
    }

    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_logged(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Connected { .. })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until every notification queued so far has been delivered
    pub async fn flush_notifications(&self) {
        self.dispatcher.flush().await
    }

    fn transition(&self, requested: SessionState) -> bool {
        let to = requested.kind();
        let mut accepted = false;

        self.state.send_if_modified(|current| {
            let from = current.kind();
            if !transition_allowed(from, to) {
                warn!("{}", InvalidTransition { from, to });
                return false;
            }

            match self.persist(&requested) {
                Ok(()) => {
                    info!("Session state: {} -> {}", from, to);
                    *current = requested;
                    self.dispatcher.dispatch(current.clone());
                    accepted = true;
                    true
                }
                // Nothing else would move the session out of Connecting
                Err(e) if from == SessionStateKind::Connecting => {
                    error!("Credential store failed leaving {}, login failed: {}", from, e);
                    if to == SessionStateKind::Connected {
                        if let Err(clear_err) = self.store.clear() {
                            warn!("Failed to erase partial credential: {}", clear_err);
                        }
                    }
                    let error = match requested {
                        SessionState::LoginFailed { error } => {
                            accepted = true;
                            error
                        }
                        _ => e.into(),
                    };
                    info!("Session state: {} -> {}", from, SessionStateKind::LoginFailed);
                    *current = SessionState::LoginFailed { error };
                    self.dispatcher.dispatch(current.clone());
                    true
                }
                Err(e) => {
                    error!("Rejecting {} -> {}: credential store failed: {}", from, to, e);
                    false
                }
            }
        });

        accepted
    }

    fn persist(&self, requested: &SessionState) -> Result<(), PersistenceError> {
        match requested {
            SessionState::Connected { session } if session.is_cached() => {
                debug!("Cached session, store left untouched");
                Ok(())
            }
            SessionState::Connected { session } => self.store.save(&session.credential()),
            SessionState::Disconnected | SessionState::LoginFailed { .. } => self.store.clear(),
            SessionState::Invalid | SessionState::Connecting => Ok(()),
        }
    }
}
