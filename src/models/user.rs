//! User-related models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name given to anonymous sessions.
pub const GUEST_NAME: &str = "Guest User";

/// Display name used when the identity provider supplies none.
pub const DEFAULT_NAME: &str = "User";

/// Cached display profile.
///
/// This is a display cache, not an identity record: nothing here is unique
/// and it is always rebuilt from a session or token, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub full_name: String,
    pub email: String,
    pub avatar_url: String,
    pub google_id: String,
}

impl UserProfile {
    /// Placeholder profile for anonymous sessions.
    pub fn guest() -> Self {
        Self {
            full_name: GUEST_NAME.to_string(),
            email: String::new(),
            avatar_url: String::new(),
            google_id: String::new(),
        }
    }

    /// Build a profile from provider `user_metadata`.
    ///
    /// Each field takes the first non-empty candidate:
    /// name from `full_name`, `name`, else [`DEFAULT_NAME`];
    /// email from metadata, then `fallback_email`;
    /// avatar from `avatar_url`, `picture`;
    /// provider id from `provider_id`, `sub`.
    pub fn from_metadata(metadata: &Value, fallback_email: Option<&str>) -> Self {
        let full_name = first_str(metadata, &["full_name", "name"])
            .unwrap_or(DEFAULT_NAME)
            .to_string();
        let email = first_str(metadata, &["email"])
            .or(fallback_email.filter(|e| !e.is_empty()))
            .unwrap_or_default()
            .to_string();
        let avatar_url = first_str(metadata, &["avatar_url", "picture"])
            .unwrap_or_default()
            .to_string();
        let google_id = first_str(metadata, &["provider_id", "sub"])
            .unwrap_or_default()
            .to_string();

        Self {
            full_name,
            email,
            avatar_url,
            google_id,
        }
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}
