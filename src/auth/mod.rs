//! Authentication and session management
//!
//! Google sign-in runs through the backend's OAuth endpoint and a system
//! browser session; the redirect it lands on is parsed into a cached
//! [`AuthToken`]. The [`SessionReconciler`] merges the backend session with
//! that cache and is the only thing the rest of the app reads.

pub mod browser;
pub mod commands;
pub mod error;
pub mod google;
pub mod guest;
pub mod reconciler;
pub mod redirect;
pub mod tokens;

pub use browser::{AuthBrowser, BrowserResult, SystemBrowser};
pub use commands::{guest_login, login, logout, signup, status, watch, whoami};
pub use error::AuthError;
pub use reconciler::SessionReconciler;
pub use tokens::{AuthToken, Clock, SystemClock, TokenStore};

use crate::models::UserProfile;

/// OAuth provider name understood by the backend
pub const GOOGLE_PROVIDER: &str = "google";

/// Result of an explicit sign-in attempt.
///
/// Cancellation is its own outcome so callers never render it as a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    Success(UserProfile),
    Cancelled,
    /// Account created, but the backend wants the email confirmed first.
    ConfirmationPending,
    Failed(AuthError),
}

impl SignInOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SignInOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            SignInOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A session that a sign-in flow has written to the token cache and/or the
/// backend client.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledSession {
    pub user_id: String,
    pub token: AuthToken,
}
