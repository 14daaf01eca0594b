//! OAuth redirect parsing
//!
//! The provider sends the user back to `<scheme>://auth/callback` with the
//! token pair either in the fragment (`#access_token=...`) or in the query
//! string. Lookup order:
//!
//! 1. the fragment, if the URL has a `#`
//! 2. otherwise the query string, if it has a `?`
//! 3. if neither produced a token pair or an error, a direct scan of the raw URL
//!
//! An `error` anywhere wins over tokens. Parsing is pure: no clock, no I/O.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use url::form_urlencoded;

use super::tokens::AuthToken;
use crate::models::UserProfile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    /// `message` is `error_description` when present, else the `error` code.
    #[error("{message}")]
    Provider { code: String, message: String },

    #[error("redirect URL carries no access/refresh token pair")]
    MissingTokens,

    #[error("malformed access token: {0}")]
    MalformedToken(String),

    #[error("invalid expires_at: {0}")]
    InvalidExpiry(String),
}

#[derive(Debug, Default)]
struct RedirectParams {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    fn from_form(encoded: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(encoded.as_bytes()) {
            params.insert(&key, value.into_owned());
        }
        params
    }

    fn scan(raw_url: &str) -> Self {
        static FIELD: OnceLock<Regex> = OnceLock::new();
        let re = FIELD.get_or_init(|| {
            Regex::new(
                r"(?:^|[?#&/;])(access_token|refresh_token|expires_at|error_description|error)=([^&#\s]*)",
            )
            .expect("static regex")
        });

        let mut params = Self::default();
        for caps in re.captures_iter(raw_url) {
            params.insert(&caps[1], decode_component(&caps[2]));
        }
        params
    }

    /// First occurrence wins; empty values count as missing.
    fn insert(&mut self, key: &str, value: String) {
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "access_token" => &mut self.access_token,
            "refresh_token" => &mut self.refresh_token,
            "expires_at" => &mut self.expires_at,
            "error" => &mut self.error,
            "error_description" => &mut self.error_description,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// A complete token pair or an error.
    fn is_conclusive(&self) -> bool {
        (self.access_token.is_some() && self.refresh_token.is_some()) || self.error.is_some()
    }
}

/// Percent-decode a single captured value (`+` is a space, as in forms).
fn decode_component(raw: &str) -> String {
    let escaped = raw.replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Extract the session carried by an OAuth redirect URL.
pub fn extract(redirect_url: &str) -> Result<AuthToken, RedirectError> {
    let mut params = if let Some((_, fragment)) = redirect_url.split_once('#') {
        RedirectParams::from_form(fragment)
    } else if let Some((_, query)) = redirect_url.split_once('?') {
        RedirectParams::from_form(query)
    } else {
        RedirectParams::default()
    };

    if !params.is_conclusive() {
        params = RedirectParams::scan(redirect_url);
    } else if params.error.is_none() {
        // Tokens in one part of the URL do not hide an error in the other.
        let scanned = RedirectParams::scan(redirect_url);
        if scanned.error.is_some() {
            params.error = scanned.error;
            params.error_description = scanned.error_description;
        }
    }

    if let Some(code) = params.error {
        let message = params.error_description.unwrap_or_else(|| code.clone());
        return Err(RedirectError::Provider { code, message });
    }

    let (Some(access_token), Some(refresh_token)) = (params.access_token, params.refresh_token)
    else {
        return Err(RedirectError::MissingTokens);
    };

    let payload = decode_jwt_payload(&access_token)?;

    let expires_at_secs = match params.expires_at {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| RedirectError::InvalidExpiry(raw.clone()))?,
        None => payload
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(RedirectError::MissingTokens)?,
    };

    let metadata = payload.get("user_metadata").cloned().unwrap_or_default();
    let top_level_email = payload.get("email").and_then(Value::as_str);
    let user_data = UserProfile::from_metadata(&metadata, top_level_email);

    Ok(AuthToken {
        access_token,
        refresh_token,
        expires_at: expires_at_secs.saturating_mul(1000),
        user_data,
        login_type: None,
    })
}

/// Decode the payload (second segment) of a dot-delimited JWT.
///
/// Accepts both base64 alphabets, with or without padding.
pub fn decode_jwt_payload(token: &str) -> Result<Value, RedirectError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() < 3 {
        return Err(RedirectError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let normalized: String = segments[1]
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let bytes = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(normalized)
        .map_err(|e| RedirectError::MalformedToken(format!("payload is not base64: {}", e)))?;

    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|e| RedirectError::MalformedToken(format!("payload is not JSON: {}", e)))?;

    if !payload.is_object() {
        return Err(RedirectError::MalformedToken(
            "payload is not a JSON object".to_string(),
        ));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_NAME;
    use crate::testing::make_jwt;
    use serde_json::json;

    const CALLBACK: &str = "photosharing://auth/callback";

    fn google_jwt() -> String {
        make_jwt(&json!({
            "sub": "8d5c-uuid",
            "email": "top@example.com",
            "exp": 1_800_000_000,
            "user_metadata": {
                "full_name": "Grace Hopper",
                "email": "grace@example.com",
                "avatar_url": "https://lh3.example/photo.jpg",
                "provider_id": "10987654321",
            }
        }))
    }

    #[test]
    fn test_fragment_redirect() {
        let jwt = google_jwt();
        let url = format!(
            "{}#access_token={}&expires_at=1700003600&expires_in=3600&refresh_token=rt-123&token_type=bearer",
            CALLBACK, jwt
        );
        let token = extract(&url).unwrap();

        assert_eq!(token.access_token, jwt);
        assert_eq!(token.refresh_token, "rt-123");
        assert_eq!(token.expires_at, 1_700_003_600_000);
        assert_eq!(
            token.user_data,
            UserProfile {
                full_name: "Grace Hopper".into(),
                email: "grace@example.com".into(),
                avatar_url: "https://lh3.example/photo.jpg".into(),
                google_id: "10987654321".into(),
            }
        );
    }

    #[test]
    fn test_query_redirect() {
        let url = format!(
            "{}?access_token={}&refresh_token=rt&expires_at=10",
            CALLBACK,
            google_jwt()
        );
        let token = extract(&url).unwrap();
        assert_eq!(token.expires_at, 10_000);
        assert_eq!(token.refresh_token, "rt");
    }

    #[test]
    fn test_error_in_fragment_wins_over_tokens() {
        let url = format!(
            "{}#access_token={}&refresh_token=rt&expires_at=10&error=access_denied&error_description=User+denied+access",
            CALLBACK,
            google_jwt()
        );
        assert_eq!(
            extract(&url),
            Err(RedirectError::Provider {
                code: "access_denied".into(),
                message: "User denied access".into(),
            })
        );
    }

    #[test]
    fn test_error_in_query_without_description() {
        let url = format!("{}?error=server_error", CALLBACK);
        assert_eq!(
            extract(&url),
            Err(RedirectError::Provider {
                code: "server_error".into(),
                message: "server_error".into(),
            })
        );
    }

    #[test]
    fn test_error_in_query_with_empty_fragment() {
        // Fragment yields nothing, so the raw scan finds the query error.
        let url = format!("{}?error=access_denied&error_description=Nope#", CALLBACK);
        assert!(matches!(
            extract(&url),
            Err(RedirectError::Provider { ref message, .. }) if message == "Nope"
        ));
    }

    #[test]
    fn test_error_in_query_wins_over_fragment_tokens() {
        let url = format!(
            "{}?error=access_denied&error_description=Denied#access_token={}&refresh_token=rt&expires_at=1",
            CALLBACK,
            google_jwt()
        );
        assert_eq!(
            extract(&url),
            Err(RedirectError::Provider {
                code: "access_denied".into(),
                message: "Denied".into(),
            })
        );
    }

    #[test]
    fn test_error_in_fragment_wins_over_query_tokens() {
        let url = format!(
            "{}?access_token={}&refresh_token=rt#error=server_error",
            CALLBACK,
            google_jwt()
        );
        assert!(matches!(
            extract(&url),
            Err(RedirectError::Provider { ref code, .. }) if code == "server_error"
        ));
    }

    #[test]
    fn test_tokens_in_query_with_unrelated_fragment() {
        let url = format!(
            "{}?access_token={}&refresh_token=rt%2Bx&expires_at=42#_=_",
            CALLBACK,
            google_jwt()
        );
        let token = extract(&url).unwrap();
        assert_eq!(token.refresh_token, "rt+x");
        assert_eq!(token.expires_at, 42_000);
    }

    #[test]
    fn test_fragment_with_leading_path_falls_back_to_scan() {
        let url = format!(
            "{}#/?access_token={}&refresh_token=rt&expires_at=7",
            CALLBACK,
            google_jwt()
        );
        assert_eq!(extract(&url).unwrap().expires_at, 7_000);
    }

    #[test]
    fn test_scan_decodes_once() {
        let url = format!(
            "{}#/error=invalid_request&error_description=Bad%2520request",
            CALLBACK
        );
        assert_eq!(
            extract(&url),
            Err(RedirectError::Provider {
                code: "invalid_request".into(),
                message: "Bad%20request".into(),
            })
        );
    }

    #[test]
    fn test_percent_encoded_fragment_values() {
        let url = format!(
            "{}#access_token={}&refresh_token=a%2Fb%3Dc&expires_at=1",
            CALLBACK,
            google_jwt()
        );
        assert_eq!(extract(&url).unwrap().refresh_token, "a/b=c");
    }

    #[test]
    fn test_missing_refresh_token() {
        let url = format!("{}#access_token={}&expires_at=1", CALLBACK, google_jwt());
        assert_eq!(extract(&url), Err(RedirectError::MissingTokens));
    }

    #[test]
    fn test_plain_callback_without_params() {
        assert_eq!(extract(CALLBACK), Err(RedirectError::MissingTokens));
        assert_eq!(extract(""), Err(RedirectError::MissingTokens));
    }

    #[test]
    fn test_expiry_falls_back_to_exp_claim() {
        let url = format!("{}#access_token={}&refresh_token=rt", CALLBACK, google_jwt());
        assert_eq!(extract(&url).unwrap().expires_at, 1_800_000_000_000);
    }

    #[test]
    fn test_invalid_expiry() {
        let url = format!(
            "{}#access_token={}&refresh_token=rt&expires_at=soon",
            CALLBACK,
            google_jwt()
        );
        assert_eq!(
            extract(&url),
            Err(RedirectError::InvalidExpiry("soon".into()))
        );
    }

    #[test]
    fn test_two_segment_token_is_malformed() {
        let url = format!("{}#access_token=abc.def&refresh_token=rt&expires_at=1", CALLBACK);
        assert!(matches!(extract(&url), Err(RedirectError::MalformedToken(_))));
    }

    #[test]
    fn test_non_json_payload_is_malformed() {
        let url = format!(
            "{}#access_token=aaa.bm90IGpzb24.ccc&refresh_token=rt&expires_at=1",
            CALLBACK
        );
        assert!(matches!(extract(&url), Err(RedirectError::MalformedToken(_))));
    }

    #[test]
    fn test_profile_fallbacks() {
        let jwt = make_jwt(&json!({
            "email": "payload@example.com",
            "user_metadata": { "name": "nick", "picture": "pic.png", "sub": "google-sub" }
        }));
        let url = format!("{}#access_token={}&refresh_token=rt&expires_at=1", CALLBACK, jwt);
        let profile = extract(&url).unwrap().user_data;
        assert_eq!(profile.full_name, "nick");
        assert_eq!(profile.email, "payload@example.com");
        assert_eq!(profile.avatar_url, "pic.png");
        assert_eq!(profile.google_id, "google-sub");
    }

    #[test]
    fn test_no_metadata_uses_defaults() {
        let jwt = make_jwt(&json!({ "sub": "x" }));
        let url = format!("{}#access_token={}&refresh_token=rt&expires_at=1", CALLBACK, jwt);
        let profile = extract(&url).unwrap().user_data;
        assert_eq!(profile.full_name, DEFAULT_NAME);
        assert_eq!(profile.email, "");
        assert_eq!(profile.avatar_url, "");
        assert_eq!(profile.google_id, "");
    }

    #[test]
    fn test_synthetic_redirect_reconstructs_profile() {
        let original = AuthToken {
            access_token: String::new(),
            refresh_token: "refresh-xyz".into(),
            expires_at: 1_750_000_000_000,
            user_data: UserProfile {
                full_name: "Katherine Johnson".into(),
                email: "kj@example.com".into(),
                avatar_url: String::new(),
                google_id: "g-42".into(),
            },
            login_type: None,
        };

        // avatar_url is left out of the payload and must come back as "".
        let jwt = make_jwt(&json!({
            "user_metadata": {
                "full_name": original.user_data.full_name,
                "email": original.user_data.email,
                "provider_id": original.user_data.google_id,
            }
        }));
        let fragment: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", &jwt)
            .append_pair("refresh_token", &original.refresh_token)
            .append_pair("expires_at", &(original.expires_at / 1000).to_string())
            .finish();
        let token = extract(&format!("{}#{}", CALLBACK, fragment)).unwrap();

        assert_eq!(token.user_data, original.user_data);
        assert_eq!(token.expires_at, original.expires_at);
        assert_eq!(token.refresh_token, original.refresh_token);
    }

    #[test]
    fn test_decode_padded_standard_alphabet() {
        let payload = base64::engine::general_purpose::STANDARD.encode(br#"{"a":"??>"}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(decode_jwt_payload(&token).unwrap(), json!({ "a": "??>" }));
    }

    #[test]
    fn test_decode_rejects_array_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"[1,2]");
        assert!(decode_jwt_payload(&format!("h.{}.s", payload)).is_err());
    }
}
