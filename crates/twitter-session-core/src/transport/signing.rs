//! OAuth 1.0a request signing (HMAC-SHA1)

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal, everything else is encoded
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Token pair used to sign a request on behalf of a user
#[derive(Clone, Copy)]
pub struct TokenPair<'a> {
    pub token: &'a str,
    pub secret: &'a str,
}

/// Consumer credentials plus the signing routine
#[derive(Clone)]
pub struct OAuthSigner {
    consumer_key: String,
    consumer_secret: String,
}

impl OAuthSigner {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Build the `Authorization` header for a request.
    ///
    /// `oauth_extra` are protocol parameters that belong in the header
    /// (`oauth_callback`, `oauth_verifier`); `request_params` are query or
    /// form parameters that are signed but sent elsewhere.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        token: Option<TokenPair<'_>>,
        oauth_extra: &[(&str, &str)],
        request_params: &[(&str, &str)],
    ) -> String {
        let nonce = Self::generate_nonce();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(
            method,
            url,
            token,
            oauth_extra,
            request_params,
            &nonce,
            &timestamp,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        token: Option<TokenPair<'_>>,
        oauth_extra: &[(&str, &str)],
        request_params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth_params: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_version", "1.0"),
        ];
        if let Some(pair) = token {
            oauth_params.push(("oauth_token", pair.token));
        }
        oauth_params.extend_from_slice(oauth_extra);

        let mut all_params = oauth_params.clone();
        all_params.extend_from_slice(request_params);
        let base = signature_base_string(method, url, &all_params);
        let signature = self.sign(&base, token.map(|p| p.secret).unwrap_or(""));

        let mut header_params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        header_params.push(("oauth_signature".to_string(), signature));
        header_params.sort();

        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    /// HMAC-SHA1 over the base string, keyed with both secrets
    pub fn sign(&self, base_string: &str, token_secret: &str) -> String {
        let key = format!("{}&{}", encode(&self.consumer_secret), encode(token_secret));
        // HMAC accepts keys of any length
        let mut mac = match HmacSha1::new_from_slice(key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA1 accepts any key length"),
        };
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn generate_nonce() -> String {
        (0..16)
            .map(|_| format!("{:02x}", rand::random::<u8>()))
            .collect()
    }
}

/// `METHOD&encoded(url)&encoded(sorted, encoded params)`
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&param_string)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encoding() {
        assert_eq!(encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(encode("An encoded string!"), "An%20encoded%20string%21");
        assert_eq!(encode("Dogs, Cats & Mice"), "Dogs%2C%20Cats%20%26%20Mice");
        assert_eq!(encode("☃"), "%E2%98%83");
        assert_eq!(encode("a-b.c_d~e"), "a-b.c_d~e");
    }

    #[test]
    fn test_signature_base_string() {
        let params = [
            ("oauth_version", "1.0"),
            ("oauth_callback", "http://127.0.0.1:9876/callback"),
            ("oauth_consumer_key", "ck"),
            ("oauth_nonce", "n"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1"),
        ];
        let base = signature_base_string("post", "https://api.example.com/oauth/request_token", &params);
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.example.com%2Foauth%2Frequest_token&\
             oauth_callback%3Dhttp%253A%252F%252F127.0.0.1%253A9876%252Fcallback\
             %26oauth_consumer_key%3Dck%26oauth_nonce%3Dn\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1%26oauth_version%3D1.0"
        );
    }

    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";

    #[test]
    fn test_twitter_signature_example() {
        let signer = OAuthSigner::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        );
        let params = [
            ("status", STATUS),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ];
        let base = signature_base_string(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog\
             %26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958\
             %26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\
             %26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen\
             %252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
        assert_eq!(
            signer.sign(&base, "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
            "hCtSmYh+iHYCEqBWrE7C7hYmtUk="
        );

        let header = signer.authorization_header_with(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            Some(TokenPair {
                token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
                secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
            }),
            &[],
            &[("status", STATUS), ("include_entities", "true")],
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            "1318622958",
        );
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(!header.contains("status="));
    }

    #[test]
    fn test_authorization_header_fields() {
        let signer = OAuthSigner::new("ck", "cs");
        let header = signer.authorization_header_with(
            "POST",
            "https://api.example.com/oauth/access_token",
            Some(TokenPair { token: "req-token", secret: "req-secret" }),
            &[("oauth_verifier", "V")],
            &[],
            "nonce1",
            "1700000000",
        );

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"ck\""));
        assert!(header.contains("oauth_token=\"req-token\""));
        assert!(header.contains("oauth_verifier=\"V\""));
        assert!(header.contains("oauth_nonce=\"nonce1\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("req-secret"));
        assert!(!header.contains("cs\""));
    }

    #[test]
    fn test_nonce_generation() {
        let nonce = OAuthSigner::generate_nonce();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
