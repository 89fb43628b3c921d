//! ============================================================================
//! Errors - Transport, Authentication and Persistence failures
//! ============================================================================
//! - TransportError: raised by an OAuthTransport call, classified as
//!   network-related or not
//! - AuthError: what an observer sees inside a LoginFailed state
//! - PersistenceError: credential store read/write/erase failure
//! - InvalidTransition: a rejected session state change (logged, never
//!   returned to callers)
//! ============================================================================

use thiserror::Error;

use crate::types::SessionStateKind;

/// Classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connectivity problem (connect refused, DNS, timeout, reset)
    Network,
    /// Server answered 5xx; reachable but unable to serve the request
    Unavailable,
    /// Non-success status other than 5xx (401, 403, ...)
    Http { status: u16 },
    /// Response body could not be understood
    Protocol,
}

/// Error returned by an OAuthTransport call
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Http { status },
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Protocol,
            message: message.into(),
        }
    }

    /// True when the failure is caused by the network rather than by a
    /// rejection of the request or credential.
    pub fn is_network(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Network | TransportErrorKind::Unavailable
        )
    }

    /// True for connectivity failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        self.kind == TransportErrorKind::Network
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Http { status } => Some(status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            Self::network(e.to_string())
        } else if e.is_decode() || e.is_body() {
            Self::protocol(e.to_string())
        } else if let Some(status) = e.status() {
            if status.is_server_error() {
                Self::unavailable(e.to_string())
            } else {
                Self::http(status.as_u16(), e.to_string())
            }
        } else {
            Self::network(e.to_string())
        }
    }
}

/// Authentication failure carried by `SessionState::LoginFailed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The server could not be reached (or could not serve the request).
    /// `transient` distinguishes plain connectivity loss from a reachable
    /// server that failed.
    #[error("network error: {message}")]
    Network { message: String, transient: bool },

    /// Protocol or credential rejection, or a local failure
    #[error("authentication error: {message}")]
    Other { message: String, status: Option<u16> },
}

impl AuthError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            status: None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Network { message, .. } | Self::Other { message, .. } => message,
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        if e.is_network() {
            Self::Network {
                transient: e.is_transient(),
                message: e.message,
            }
        } else {
            Self::Other {
                status: e.status(),
                message: e.message,
            }
        }
    }
}

impl From<PersistenceError> for AuthError {
    fn from(e: PersistenceError) -> Self {
        Self::other(format!("credential store: {}", e))
    }
}

/// Credential store failure
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: redb::Error,
    },

    #[error("failed to encode field {field}: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: bincode::Error,
    },
}

impl PersistenceError {
    /// Adapter for `map_err` on any redb operation.
    pub(crate) fn storage<E: Into<redb::Error>>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Storage {
            context,
            source: e.into(),
        }
    }
}

/// A requested session state change that the transition table rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionStateKind,
    pub to: SessionStateKind,
}
