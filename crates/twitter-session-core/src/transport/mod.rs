//! ============================================================================
//! Transport Module - OAuth network operations
//! ============================================================================
//! The session core talks to Twitter only through `OAuthTransport`:
//! - obtain a request token + authorization URL
//! - exchange (request token, verifier) for an access credential
//! - fetch the authenticated user's screen name
//! - fetch the authenticated user's timeline
//!
//! Resource calls take the credential explicitly; a transport holds no
//! per-user state.
//! ============================================================================

mod signing;
mod twitter;

pub use signing::{encode as oauth_encode, signature_base_string, OAuthSigner, TokenPair};
pub use twitter::TwitterTransport;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Credential, RequestToken, Tweet};

#[async_trait]
pub trait OAuthTransport: Send + Sync {
    /// First leg: request token plus the URL the user must visit
    async fn get_request_token(&self) -> Result<RequestToken, TransportError>;

    /// Third leg: trade the authorized request token for an access credential
    async fn get_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<Credential, TransportError>;

    /// Screen name of the user owning `credential`
    async fn fetch_screen_name(&self, credential: &Credential) -> Result<String, TransportError>;

    /// Most recent statuses of the user owning `credential`
    async fn fetch_user_timeline(
        &self,
        credential: &Credential,
        count: u32,
    ) -> Result<Vec<Tweet>, TransportError>;
}
