//! Auto-login: restore a stored credential at startup.
//!
//! The screen name is re-fetched to confirm the credential. When the server
//! cannot be reached, the cached identity is accepted as-is (offline).

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::SessionMachine;
use crate::error::{AuthError, TransportError};
use crate::transport::OAuthTransport;
use crate::types::{Credential, Session, SessionOrigin};

/// Enter Connecting and verify `credential` on a background task.
///
/// Returns None when Connecting was refused; the machine is then settled
/// at Disconnected.
pub(crate) fn start(
    machine: &Arc<SessionMachine>,
    transport: Arc<dyn OAuthTransport>,
    credential: Credential,
    runtime: &Handle,
) -> Option<JoinHandle<()>> {
    if !machine.request_connecting() {
        warn!("Auto-login could not enter connecting, settling disconnected");
        machine.disconnect();
        return None;
    }

    info!("Auto-login for user {}", credential.user_id);
    let machine = Arc::clone(machine);
    Some(runtime.spawn(async move {
        let fetched = transport.fetch_screen_name(&credential).await;
        match resolve(credential, fetched) {
            Ok(session) => {
                machine.complete_connected(session);
            }
            Err(error) => {
                machine.fail_login(error);
            }
        }
    }))
}

/// Turn the screen-name fetch outcome into a session or a login failure
pub(crate) fn resolve(
    credential: Credential,
    fetched: Result<String, TransportError>,
) -> Result<Session, AuthError> {
    match fetched {
        Ok(screen_name) => {
            info!("Credential verified for @{}", screen_name);
            let user_id = credential.user_id;
            Ok(Session::new(credential, user_id, screen_name, SessionOrigin::Verified))
        }
        Err(e) if e.is_network() => {
            if credential.screen_name.is_empty() || credential.user_id <= 0 {
                warn!("Auto-login offline with no cached identity: {}", e);
                return Err(e.into());
            }
            warn!(
                "Auto-login offline, using cached identity @{}: {}",
                credential.screen_name, e
            );
            let user_id = credential.user_id;
            let screen_name = credential.screen_name.clone();
            Ok(Session::new(credential, user_id, screen_name, SessionOrigin::Cached))
        }
        Err(e) => {
            warn!("Stored credential rejected: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CredentialStore;
    use crate::dispatcher::CallbackDispatcher;
    use crate::test_support::{FakeTransport, FlakyStore, RecordingObserver};
    use crate::types::SessionStateKind;

    fn alice() -> Credential {
        Credential::new("tok-alice", "sec-alice", 42, "alice")
    }

    #[test]
    fn test_resolve_verified() {
        let session = resolve(alice(), Ok("alice_renamed".into())).unwrap();
        assert_eq!(session.screen_name(), "alice_renamed");
        assert_eq!(session.user_id(), 42);
        assert_eq!(session.origin(), SessionOrigin::Verified);
    }

    #[test]
    fn test_resolve_offline_uses_cache() {
        let session = resolve(alice(), Err(TransportError::network("timed out"))).unwrap();
        assert_eq!(session.screen_name(), "alice");
        assert!(session.is_cached());

        // 5xx counts as network as well
        let session = resolve(alice(), Err(TransportError::unavailable("503"))).unwrap();
        assert!(session.is_cached());
    }

    #[test]
    fn test_resolve_offline_without_cache_fails() {
        let nameless = Credential::new("tok", "sec", 42, "");
        let err = resolve(nameless, Err(TransportError::network("timed out"))).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_resolve_rejected() {
        let err = resolve(alice(), Err(TransportError::http(401, "Invalid or expired token")))
            .unwrap_err();
        assert!(!err.is_network());
    }

    #[tokio::test]
    async fn test_logout_during_verification_wins() {
        let store = FlakyStore::new();
        store.save(&alice()).unwrap();
        let observer = RecordingObserver::new();
        let dispatcher = CallbackDispatcher::spawn(&Handle::current(), observer.clone());
        let machine = Arc::new(SessionMachine::new(store.clone(), dispatcher));

        let transport = Arc::new(FakeTransport::new());
        transport.screen_name_gate.close();
        let task = start(&machine, transport.clone(), alice(), &Handle::current()).unwrap();

        assert!(machine.disconnect());
        transport.screen_name_gate.open();
        task.await.unwrap();

        // late verification is rejected: Disconnected -> Connected
        assert_eq!(machine.current_state().kind(), SessionStateKind::Disconnected);
        assert_eq!(store.load().unwrap(), None);
        machine.flush_notifications().await;
        assert_eq!(
            observer.kinds(),
            vec![SessionStateKind::Connecting, SessionStateKind::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_refused_connecting_settles_disconnected() {
        let store = FlakyStore::new();
        let observer = RecordingObserver::new();
        let dispatcher = CallbackDispatcher::spawn(&Handle::current(), observer.clone());
        let machine = Arc::new(SessionMachine::new(store, dispatcher));
        machine.request_connecting();

        let transport = Arc::new(FakeTransport::new());
        assert!(start(&machine, transport.clone(), alice(), &Handle::current()).is_none());
        assert_eq!(machine.current_state().kind(), SessionStateKind::Disconnected);
        assert!(transport.verified().is_empty());
    }
}
