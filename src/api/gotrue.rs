//! Hosted auth service client
//!
//! Keeps the current [`Session`] in memory and in persistent storage, and
//! announces every change on a broadcast channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};

use super::client::SupabaseClient;
use super::{AuthBackend, BackendError, OAuthOptions};
use crate::auth::redirect::decode_jwt_payload;
use crate::auth::Clock;
use crate::config::KeyValueStorage;
use crate::models::{AuthEvent, BackendUser, Session};

pub const SESSION_KEY: &str = "@backend_session";

/// Refresh this many seconds before the session actually expires.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Lifetime assumed when neither the response nor the JWT carries one.
const DEFAULT_SESSION_SECS: i64 = 3600;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: BackendUser,
}

impl TokenResponse {
    fn into_session(self, now_secs: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now_secs + secs))
            .unwrap_or(now_secs + DEFAULT_SESSION_SECS);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

enum Slot {
    Unloaded,
    Loaded(Option<Session>),
}

pub struct GoTrueBackend {
    client: SupabaseClient,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    session: Mutex<Slot>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueBackend {
    pub fn new(
        client: SupabaseClient,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            storage,
            clock,
            session: Mutex::new(Slot::Unloaded),
            events,
        }
    }

    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!("Auth event {}", event.kind());
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn load_persisted(&self) -> Option<Session> {
        match self.storage.get(SESSION_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("Discarding unreadable stored session: {}", e);
                    self.forget_persisted().await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored session: {:#}", e);
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        let result = match serde_json::to_string(session) {
            Ok(raw) => self.storage.set(SESSION_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist session: {:#}", e);
        }
    }

    async fn forget_persisted(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY).await {
            tracing::warn!("Failed to remove stored session: {:#}", e);
        }
    }

    /// Replace the current session and announce it.
    async fn install(&self, session: Session, event: fn(Session) -> AuthEvent) -> Session {
        {
            let mut slot = self.session.lock().await;
            *slot = Slot::Loaded(Some(session.clone()));
        }
        self.persist(&session).await;
        self.emit(event(session.clone()));
        session
    }

    async fn clear(&self) {
        {
            let mut slot = self.session.lock().await;
            *slot = Slot::Loaded(None);
        }
        self.forget_persisted().await;
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let url = self.client.auth_url("/token", &[("grant_type", grant_type)])?;
        let resp = self.client.auth_post(url, &body, None).await?;
        let token: TokenResponse = resp.json().await?;
        Ok(token.into_session(self.clock.now_secs()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        tracing::info!("Refreshing backend session...");
        self.token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }
}

#[async_trait]
impl AuthBackend for GoTrueBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let current = {
            let mut slot = self.session.lock().await;
            if let Slot::Unloaded = *slot {
                *slot = Slot::Loaded(self.load_persisted().await);
            }
            match &*slot {
                Slot::Loaded(session) => session.clone(),
                Slot::Unloaded => None,
            }
        };

        let Some(session) = current else {
            return Ok(None);
        };
        if !session.is_expired_at(self.clock.now_secs() + EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }

        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => Ok(Some(self.install(fresh, AuthEvent::TokenRefreshed).await)),
            Err(e) => {
                if e.is_client_error() {
                    // Refresh token revoked or already used; the session is gone.
                    tracing::warn!("Session refresh rejected: {}", e);
                    self.clear().await;
                    self.emit(AuthEvent::SignedOut);
                }
                Err(e)
            }
        }
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        options: &OAuthOptions,
    ) -> Result<String, BackendError> {
        let mut query: Vec<(&str, &str)> = vec![("provider", provider)];
        if !options.redirect_to.is_empty() {
            query.push(("redirect_to", options.redirect_to.as_str()));
        }
        query.extend(
            options
                .query_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        Ok(self.client.auth_url("/authorize", &query)?.to_string())
    }

    async fn sign_in_anonymously(&self) -> Result<Session, BackendError> {
        let url = self.client.auth_url("/signup", &[])?;
        let resp = self.client.auth_post(url, &json!({ "data": {} }), None).await?;
        let token: TokenResponse = resp.json().await?;
        let session = token.into_session(self.clock.now_secs());
        Ok(self.install(session, AuthEvent::SignedIn).await)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(self.install(session, AuthEvent::SignedIn).await)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Value,
    ) -> Result<Option<Session>, BackendError> {
        let url = self.client.auth_url("/signup", &[])?;
        let body = json!({ "email": email, "password": password, "data": data });
        let resp = self.client.auth_post(url, &body, None).await?;
        let value: Value = resp.json().await?;

        // Without auto-confirm the response is the bare user record.
        if value.get("access_token").is_none() {
            tracing::info!("Sign-up accepted, confirmation pending");
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|e| BackendError::new(format!("Unexpected sign-up response: {}", e)))?;
        let session = token.into_session(self.clock.now_secs());
        Ok(Some(self.install(session, AuthEvent::SignedIn).await))
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, BackendError> {
        let url = self.client.auth_url("/user", &[])?;
        let resp = self.client.auth_get(url, Some(access_token)).await?;
        let user: BackendUser = resp.json().await?;

        let expires_at = decode_jwt_payload(access_token)
            .ok()
            .and_then(|payload| payload.get("exp").and_then(Value::as_i64))
            .unwrap_or_else(|| self.clock.now_secs() + DEFAULT_SESSION_SECS);

        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            user,
        };
        Ok(self.install(session, AuthEvent::SignedIn).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let current = {
            let slot = self.session.lock().await;
            match &*slot {
                Slot::Loaded(session) => session.clone(),
                Slot::Unloaded => None,
            }
        };
        let current = match current {
            Some(session) => Some(session),
            None => self.load_persisted().await,
        };

        let mut remote = Ok(());
        if let Some(session) = current {
            let url = self.client.auth_url("/logout", &[])?;
            match self
                .client
                .auth_post(url, &json!({}), Some(&session.access_token))
                .await
            {
                Ok(_) => {}
                // The token is already invalid server-side.
                Err(e) if matches!(e.status, Some(401) | Some(403) | Some(404)) => {}
                Err(e) => remote = Err(e),
            }
        }

        self.clear().await;
        self.emit(AuthEvent::SignedOut);
        remote
    }
}
