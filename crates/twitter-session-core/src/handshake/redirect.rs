//! Classification of navigation attempts during the authorization step

use url::Url;

pub const DENIED_QUERY: &str = "denied";
pub const OAUTH_TOKEN_QUERY: &str = "oauth_token";
pub const OAUTH_VERIFIER_QUERY: &str = "oauth_verifier";

/// What a navigation attempt means for the flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Navigation inside the authorization host, or unrelated to the flow
    Passthrough,
    /// The user refused access
    Denied,
    /// The user granted access
    Granted { token: String, verifier: String },
}

/// Host component of `url`, if it parses and has one
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Classify a navigation to `url` given the authorization page's host.
///
/// Only navigations leaving `auth_host` can end the flow. A `denied`
/// parameter wins over a token/verifier pair.
pub fn classify(url: &str, auth_host: &str) -> Redirect {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return Redirect::Passthrough,
    };

    if parsed.host_str() == Some(auth_host) {
        return Redirect::Passthrough;
    }

    let mut denied = false;
    let mut token = None;
    let mut verifier = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            DENIED_QUERY => denied = true,
            OAUTH_TOKEN_QUERY => token = Some(value.into_owned()),
            OAUTH_VERIFIER_QUERY => verifier = Some(value.into_owned()),
            _ => {}
        }
    }

    if denied {
        return Redirect::Denied;
    }
    match (token, verifier) {
        (Some(token), Some(verifier)) => Redirect::Granted { token, verifier },
        _ => Redirect::Passthrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "api.example.com";

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://api.example.com/oauth/authorize?oauth_token=T").as_deref(),
            Some(HOST)
        );
        assert_eq!(host_of("myapp://callback?x=1").as_deref(), Some("callback"));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_granted_redirect() {
        assert_eq!(
            classify("myapp://callback?oauth_token=T&oauth_verifier=V", HOST),
            Redirect::Granted {
                token: "T".into(),
                verifier: "V".into()
            }
        );
    }

    #[test]
    fn test_denied_redirect() {
        assert_eq!(classify("myapp://callback?denied=1", HOST), Redirect::Denied);
        assert_eq!(
            classify("myapp://callback?denied=T&oauth_token=T&oauth_verifier=V", HOST),
            Redirect::Denied
        );
    }

    #[test]
    fn test_same_host_passes_through() {
        assert_eq!(
            classify("https://api.example.com/oauth/authorize?oauth_token=T&oauth_verifier=V", HOST),
            Redirect::Passthrough
        );
        assert_eq!(
            classify("https://api.example.com/login?denied=1", HOST),
            Redirect::Passthrough
        );
    }

    #[test]
    fn test_incomplete_grant_passes_through() {
        assert_eq!(classify("myapp://callback?oauth_token=T", HOST), Redirect::Passthrough);
        assert_eq!(classify("https://twitter.com/signup", HOST), Redirect::Passthrough);
        assert_eq!(classify("::garbage::", HOST), Redirect::Passthrough);
    }
}
