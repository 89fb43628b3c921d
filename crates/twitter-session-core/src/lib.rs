//! ============================================================================
//! TWITTER-SESSION-CORE: OAuth session lifecycle for Twitter clients
//! ============================================================================
//! This crate owns everything between "the user clicks login" and "the app
//! holds a verified credential":
//! - Three-legged OAuth 1.0a handshake driven through a web navigator
//! - Session state machine with a strict transition table
//! - Durable credential storage in an embedded redb database
//! - Auto-login at startup, with offline acceptance of a cached identity
//! - Ordered, single-consumer delivery of state changes to an observer
//! ============================================================================

pub mod client;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod navigator;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use client::TwitterSession;
pub use config::SessionConfig;
pub use db::{CredentialDb, CredentialStore};
pub use dispatcher::{CallbackDispatcher, SessionObserver};
pub use error::{AuthError, InvalidTransition, PersistenceError, TransportError, TransportErrorKind};
pub use handshake::{HandshakeController, HandshakeEvent, HandshakeListener, HandshakePhase};
pub use navigator::{LoopbackNavigator, NavigationDecision, NavigationSink, WebNavigator};
pub use session::{transition_allowed, SessionMachine};
pub use transport::{OAuthTransport, TwitterTransport};
pub use types::*;
