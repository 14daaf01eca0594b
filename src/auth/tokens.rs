//! Token storage and management
//!
//! One cached [`AuthToken`] lives in persistent storage. Reads fail closed:
//! anything unreadable or expired is evicted and reported as absent.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::redirect::decode_jwt_payload;
use crate::config::KeyValueStorage;
use crate::models::{LoginType, Session, UserProfile};

pub const TOKEN_KEY: &str = "@auth_token";
pub const USER_DATA_KEY: &str = "@user_data";

/// Persisted session cache record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (milliseconds).
    pub expires_at: i64,
    pub user_data: UserProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_type: Option<LoginType>,
}

impl AuthToken {
    /// Mirror a backend session into a cache record.
    pub fn from_session(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at.saturating_mul(1000),
            user_data: session.profile(),
            login_type: Some(session.login_type()),
        }
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }

    /// The `sub` claim of the access token, when it has one.
    pub fn subject(&self) -> Option<String> {
        decode_jwt_payload(&self.access_token)
            .ok()?
            .get("sub")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

/// Source of the current time, injectable for expiry tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;

    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// The single global token slot.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    // Held across every multi-key read or write.
    lock: tokio::sync::Mutex<()>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Overwrite the cached token. Never merges with the previous record.
    pub async fn store(&self, token: &AuthToken) -> Result<()> {
        let token_json = serde_json::to_string(token).context("Failed to serialize token")?;
        let user_json =
            serde_json::to_string(&token.user_data).context("Failed to serialize user data")?;

        let _guard = self.lock.lock().await;
        self.storage
            .set(TOKEN_KEY, &token_json)
            .await
            .context("Failed to write token")?;
        self.storage
            .set(USER_DATA_KEY, &user_json)
            .await
            .context("Failed to write user data")?;
        tracing::debug!("Stored auth token (expires_at {})", token.expires_at);
        Ok(())
    }

    /// The cached token, if present, readable and unexpired.
    pub async fn get(&self) -> Option<AuthToken> {
        let _guard = self.lock.lock().await;

        let raw = match self.storage.get(TOKEN_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read cached token: {:#}", e);
                return None;
            }
        };

        let token: AuthToken = match serde_json::from_str(&raw) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Discarding unreadable cached token: {}", e);
                self.clear_locked().await;
                return None;
            }
        };

        if token.is_expired_at(self.clock.now_millis()) {
            tracing::info!("Cached token expired, clearing");
            self.clear_locked().await;
            return None;
        }

        Some(token)
    }

    /// Cached display profile, without expiry checks.
    pub async fn user_data(&self) -> Option<UserProfile> {
        let _guard = self.lock.lock().await;
        match self.storage.get(USER_DATA_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| tracing::warn!("Unreadable cached user data: {}", e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read cached user data: {:#}", e);
                None
            }
        }
    }

    pub async fn clear(&self) {
        let _guard = self.lock.lock().await;
        self.clear_locked().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.get().await.is_some()
    }

    async fn clear_locked(&self) {
        for key in [TOKEN_KEY, USER_DATA_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::warn!("Failed to remove {}: {:#}", key, e);
            }
        }
    }
}
