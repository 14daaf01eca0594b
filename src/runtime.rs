//! Wiring of the long-lived services a command needs

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{AuthBackend, GoTrueBackend, SupabaseClient};
use crate::auth::{Clock, SessionReconciler, SystemClock, TokenStore};
use crate::config::{AppConfig, FileStorage, KeyValueStorage};

pub struct Runtime {
    pub config: AppConfig,
    pub backend: Arc<GoTrueBackend>,
    pub tokens: Arc<TokenStore>,
    pub reconciler: Arc<SessionReconciler>,
}

impl Runtime {
    /// Load config and build the backend client, token cache and reconciler.
    pub fn connect() -> Result<Self> {
        let config = AppConfig::load()?;
        config.ensure_backend()?;

        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::open_default().context("Failed to open storage")?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let backend = Arc::new(GoTrueBackend::new(
            SupabaseClient::new(&config),
            storage.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenStore::new(storage, clock));
        let reconciler = SessionReconciler::new(backend.clone(), tokens.clone(), &config);

        Ok(Self {
            config,
            backend,
            tokens,
            reconciler,
        })
    }

    /// Access token and user id for data calls, after startup reconciliation.
    pub async fn credentials(&self) -> Result<(String, String)> {
        let state = self.reconciler.start().await;
        anyhow::ensure!(
            state.is_authenticated,
            "Not signed in. Run 'photoshare login' or 'photoshare guest'."
        );
        data_credentials(self.backend.as_ref(), &self.tokens).await
    }
}

/// Token and user id taken from the same session, so rows are written for
/// the account the token belongs to.
///
/// The backend session is preferred; a cached token only counts when its
/// access token names a subject.
pub async fn data_credentials(
    backend: &dyn AuthBackend,
    tokens: &TokenStore,
) -> Result<(String, String)> {
    match backend.get_session().await {
        Ok(Some(session)) => return Ok((session.access_token, session.user.id)),
        Ok(None) => {}
        Err(e) => tracing::warn!("Backend session unavailable, using cached token: {}", e),
    }

    let token = tokens
        .get()
        .await
        .context("No access token available. Run 'photoshare login'.")?;
    let user_id = token
        .subject()
        .context("Cached session has no user id. Run 'photoshare login' again.")?;
    Ok((token.access_token, user_id))
}
