//! ============================================================================
//! Session Types - Credential, Session, SessionState
//! ============================================================================

use std::fmt;

use crate::error::AuthError;

/// Durable (token, secret, user id, screen name) tuple identifying an
/// authenticated Twitter account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub token_secret: String,
    pub user_id: i64,
    pub screen_name: String,
}

impl Credential {
    pub fn new(
        token: impl Into<String>,
        token_secret: impl Into<String>,
        user_id: i64,
        screen_name: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            token_secret: token_secret.into(),
            user_id,
            screen_name: screen_name.into(),
        }
    }

    /// A credential is usable only with a positive user id and a token pair.
    pub fn is_valid(&self) -> bool {
        self.user_id > 0 && !self.token.is_empty() && !self.token_secret.is_empty()
    }
}

// Never print the secret; tokens only as a short prefix.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &redact(&self.token))
            .field("token_secret", &"***")
            .field("user_id", &self.user_id)
            .field("screen_name", &self.screen_name)
            .finish()
    }
}

/// Shorten a token for logs
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}...", prefix)
}

/// Request token handed out by the first leg of the handshake
#[derive(Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
    pub authorization_url: String,
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &redact(&self.token))
            .field("authorization_url", &self.authorization_url)
            .finish()
    }
}

/// How the identity of a session was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Fresh three-legged handshake
    Handshake,
    /// Stored credential confirmed by the server
    Verified,
    /// Stored credential accepted without server confirmation (offline)
    Cached,
}

/// In-memory authenticated identity. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    credential: Credential,
    user_id: i64,
    screen_name: String,
    origin: SessionOrigin,
}

impl Session {
    pub fn new(
        credential: Credential,
        user_id: i64,
        screen_name: impl Into<String>,
        origin: SessionOrigin,
    ) -> Self {
        Self {
            credential,
            user_id,
            screen_name: screen_name.into(),
            origin,
        }
    }

    /// Session for a credential just obtained from the token exchange
    pub fn from_handshake(credential: Credential) -> Self {
        let user_id = credential.user_id;
        let screen_name = credential.screen_name.clone();
        Self::new(credential, user_id, screen_name, SessionOrigin::Handshake)
    }

    /// Credential as it should be persisted for this session. The screen
    /// name reported by the server wins over the one captured earlier.
    pub fn credential(&self) -> Credential {
        Credential {
            screen_name: self.screen_name.clone(),
            user_id: self.user_id,
            ..self.credential.clone()
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    /// True when the session was accepted from cached data only
    pub fn is_cached(&self) -> bool {
        self.origin == SessionOrigin::Cached
    }
}

/// Current authentication state. Exactly one is current at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Invalid,
    Disconnected,
    Connecting,
    Connected {
        session: Session,
    },
    LoginFailed {
        error: AuthError,
    },
}

impl SessionState {
    pub fn kind(&self) -> SessionStateKind {
        match self {
            Self::Invalid => SessionStateKind::Invalid,
            Self::Disconnected => SessionStateKind::Disconnected,
            Self::Connecting => SessionStateKind::Connecting,
            Self::Connected { .. } => SessionStateKind::Connected,
            Self::LoginFailed { .. } => SessionStateKind::LoginFailed,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Connected { session } => Some(session),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::LoginFailed { error } => Some(error),
            _ => None,
        }
    }

    /// True once startup or a login attempt has produced an outcome
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Invalid | Self::Connecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { session } => write!(
                f,
                "connected as @{} (user id {}{})",
                session.screen_name(),
                session.user_id(),
                if session.is_cached() { ", offline" } else { "" }
            ),
            Self::LoginFailed { error } => write!(f, "login failed: {}", error),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Payload-free discriminant of SessionState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStateKind {
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    LoginFailed,
}

impl SessionStateKind {
    pub const ALL: [SessionStateKind; 5] = [
        Self::Invalid,
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::LoginFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::LoginFailed => "login_failed",
        }
    }
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status from the authenticated user's timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: String,
}
