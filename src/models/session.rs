//! Backend session and auth-state models

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UserProfile;

/// How the current identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Google,
    Email,
    Guest,
}

impl fmt::Display for LoginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoginType::Google => "google",
            LoginType::Email => "email",
            LoginType::Guest => "guest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

/// User record as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub app_metadata: AppMetadata,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Authoritative session owned by the backend client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub user: BackendUser,
}

impl Session {
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at <= now_secs
    }

    pub fn provider(&self) -> Option<&str> {
        self.user.app_metadata.provider.as_deref()
    }

    pub fn login_type(&self) -> LoginType {
        if self.user.is_anonymous {
            LoginType::Guest
        } else if self.provider() == Some("google") {
            LoginType::Google
        } else {
            LoginType::Email
        }
    }

    /// Display profile derived from the session's user record.
    pub fn profile(&self) -> UserProfile {
        if self.user.is_anonymous {
            return UserProfile::guest();
        }
        UserProfile::from_metadata(&self.user.user_metadata, self.user.email.as_deref())
    }
}

/// Auth-state change pushed by the backend client.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    /// Any event kind this client does not act on.
    Other(String),
}

impl AuthEvent {
    pub fn kind(&self) -> &str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::Other(kind) => kind,
        }
    }
}

/// The single current-user view exposed to the rest of the application.
///
/// Always derived from a [`Session`] or a cached token; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub user_id: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub login_type: Option<LoginType>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            user: None,
            user_id: None,
            is_authenticated: false,
            is_loading: true,
            login_type: None,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            is_loading: false,
            ..Self::loading()
        }
    }

    pub fn signed_in(user: UserProfile, user_id: String, login_type: Option<LoginType>) -> Self {
        Self {
            user: Some(user),
            user_id: Some(user_id),
            is_authenticated: true,
            is_loading: false,
            login_type,
        }
    }
}
