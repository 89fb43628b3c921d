//! ============================================================================
//! Twitter Transport - OAuth 1.0a three-legged flow over reqwest
//! ============================================================================
//! Endpoints:
//! - POST /oauth/request_token
//! - GET  /oauth/authorize (opened by the user, never called here)
//! - POST /oauth/access_token
//! - GET  /1.1/account/verify_credentials.json
//! - GET  /1.1/statuses/user_timeline.json
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::signing::{encode, OAuthSigner, TokenPair};
use super::OAuthTransport;
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::types::{redact, Credential, RequestToken, Tweet};

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Live Twitter implementation of `OAuthTransport`
pub struct TwitterTransport {
    client: Client,
    signer: OAuthSigner,
    base_url: String,
    callback_url: String,
}

impl TwitterTransport {
    /// Create a transport from configuration. Fails without consumer keys.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let consumer_key = config
            .consumer_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("TWITTER_CONSUMER_KEY not set"))?;
        let consumer_secret = config
            .consumer_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("TWITTER_CONSUMER_SECRET not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            signer: OAuthSigner::new(consumer_key, consumer_secret),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            callback_url: config.callback_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL the user visits to authorize `token`
    pub fn authorization_url(&self, token: &str) -> String {
        format!("{}?oauth_token={}", self.endpoint("/oauth/authorize"), encode(token))
    }

    /// Send a request, turning non-success statuses into classified errors
    async fn send(&self, request: RequestBuilder) -> Result<String, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let body = truncate_body(&body);
        warn!("Twitter API error {}: {}", status, body);
        if status.is_server_error() {
            Err(TransportError::unavailable(format!("Twitter API error {}: {}", status, body)))
        } else {
            Err(TransportError::http(
                status.as_u16(),
                format!("Twitter API error {}: {}", status, body),
            ))
        }
    }

    fn signed_get(&self, url: &str, credential: &Credential, query: &[(&str, &str)]) -> RequestBuilder {
        let auth = self.signer.authorization_header(
            "GET",
            url,
            Some(TokenPair {
                token: &credential.token,
                secret: &credential.token_secret,
            }),
            &[],
            query,
        );
        self.client
            .get(url)
            .query(query)
            .header(header::AUTHORIZATION, auth)
    }
}

#[async_trait]
impl OAuthTransport for TwitterTransport {
    async fn get_request_token(&self) -> Result<RequestToken, TransportError> {
        let url = self.endpoint("/oauth/request_token");
        info!("Requesting OAuth request token");

        let auth = self.signer.authorization_header(
            "POST",
            &url,
            None,
            &[("oauth_callback", self.callback_url.as_str())],
            &[],
        );
        let body = self
            .send(self.client.post(&url).header(header::AUTHORIZATION, auth))
            .await?;

        let (token, secret) = parse_request_token(&body)?;
        let authorization_url = self.authorization_url(&token);
        debug!("Got request token {}", redact(&token));

        Ok(RequestToken {
            token,
            secret,
            authorization_url,
        })
    }

    async fn get_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<Credential, TransportError> {
        let url = self.endpoint("/oauth/access_token");
        info!("Exchanging request token {} for access token", redact(&request_token.token));

        let auth = self.signer.authorization_header(
            "POST",
            &url,
            Some(TokenPair {
                token: &request_token.token,
                secret: &request_token.secret,
            }),
            &[("oauth_verifier", verifier)],
            &[],
        );
        let body = self
            .send(self.client.post(&url).header(header::AUTHORIZATION, auth))
            .await?;

        let credential = parse_access_token(&body)?;
        info!("Obtained access token for @{}", credential.screen_name);
        Ok(credential)
    }

    async fn fetch_screen_name(&self, credential: &Credential) -> Result<String, TransportError> {
        let url = self.endpoint("/1.1/account/verify_credentials.json");
        debug!("Verifying credentials for user {}", credential.user_id);

        let query = [("include_entities", "false"), ("skip_status", "true")];
        let body = self.send(self.signed_get(&url, credential, &query)).await?;

        #[derive(Deserialize)]
        struct VerifyCredentials {
            screen_name: String,
        }

        let account: VerifyCredentials = serde_json::from_str(&body)
            .map_err(|e| TransportError::protocol(format!("Failed to parse account: {}", e)))?;
        Ok(account.screen_name)
    }

    async fn fetch_user_timeline(
        &self,
        credential: &Credential,
        count: u32,
    ) -> Result<Vec<Tweet>, TransportError> {
        let url = self.endpoint("/1.1/statuses/user_timeline.json");
        let count = count.to_string();
        let query = [("count", count.as_str()), ("trim_user", "true")];

        let body = self.send(self.signed_get(&url, credential, &query)).await?;
        let tweets = parse_timeline(&body)?;
        debug!("Loaded {} statuses", tweets.len());
        Ok(tweets)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated, {} total bytes)", cut, body.len())
    }
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn required(params: &HashMap<String, String>, key: &str) -> Result<String, TransportError> {
    params
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| TransportError::protocol(format!("Missing {} in token response", key)))
}

fn parse_request_token(body: &str) -> Result<(String, String), TransportError> {
    let params = parse_form(body);
    if params.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
        warn!("Request token response did not confirm the callback");
    }
    Ok((
        required(&params, "oauth_token")?,
        required(&params, "oauth_token_secret")?,
    ))
}

fn parse_access_token(body: &str) -> Result<Credential, TransportError> {
    let params = parse_form(body);
    let user_id = required(&params, "user_id")?
        .parse::<i64>()
        .map_err(|e| TransportError::protocol(format!("Invalid user_id: {}", e)))?;
    if user_id <= 0 {
        return Err(TransportError::protocol(format!("Invalid user_id: {}", user_id)));
    }

    Ok(Credential {
        token: required(&params, "oauth_token")?,
        token_secret: required(&params, "oauth_token_secret")?,
        user_id,
        screen_name: params.get("screen_name").cloned().unwrap_or_default(),
    })
}

fn parse_timeline(body: &str) -> Result<Vec<Tweet>, TransportError> {
    #[derive(Deserialize)]
    struct Status {
        id_str: String,
        #[serde(default, alias = "full_text")]
        text: String,
        #[serde(default)]
        created_at: String,
    }

    let statuses: Vec<Status> = serde_json::from_str(body)
        .map_err(|e| TransportError::protocol(format!("Failed to parse timeline: {}", e)))?;

    Ok(statuses
        .into_iter()
        .map(|s| Tweet {
            id: s.id_str,
            text: s.text,
            created_at: s.created_at,
        })
        .collect())
}
