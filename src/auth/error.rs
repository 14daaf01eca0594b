//! Sign-in error taxonomy

use thiserror::Error;

use super::redirect::RedirectError;
use crate::api::BackendError;

/// Failure reported from an explicit sign-in attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The OAuth provider put an `error` in the redirect.
    #[error("Sign-in was rejected by the provider: {0}")]
    Provider(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("{0}")]
    InvalidInput(String),

    #[error("No redirect URL received")]
    NoRedirectUrl,
}

impl From<RedirectError> for AuthError {
    fn from(err: RedirectError) -> Self {
        match err {
            RedirectError::Provider { message, .. } => AuthError::Provider(message),
            RedirectError::MalformedToken(reason) | RedirectError::InvalidExpiry(reason) => {
                AuthError::MalformedToken(reason)
            }
            RedirectError::MissingTokens => AuthError::AuthenticationFailed,
        }
    }
}
