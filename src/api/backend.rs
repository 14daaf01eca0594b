//! Auth backend interface
//!
//! The hosted auth service is an external collaborator; this trait is the
//! whole surface the session layer depends on.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{AuthEvent, Session};

/// Error object returned by the backend, carrying a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// 4xx responses: the request itself was rejected.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Options for building an OAuth authorization URL.
#[derive(Debug, Clone, Default)]
pub struct OAuthOptions {
    pub redirect_to: String,
    pub query_params: Vec<(String, String)>,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session, refreshed if it has expired.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Authorization URL for `provider`. Does not start a session by itself.
    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        options: &OAuthOptions,
    ) -> Result<String, BackendError>;

    async fn sign_in_anonymously(&self) -> Result<Session, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// `Ok(None)` when the account was created but awaits email confirmation.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Value,
    ) -> Result<Option<Session>, BackendError>;

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, BackendError>;

    /// Auth-state change feed. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_out(&self) -> Result<(), BackendError>;
}
