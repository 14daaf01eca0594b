//! Test doubles shared across module tests

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::api::{AuthBackend, BackendError, OAuthOptions};
use crate::auth::{AuthBrowser, BrowserResult, Clock};
use crate::config::KeyValueStorage;
use crate::models::{AppMetadata, AuthEvent, BackendUser, Session};

/// Far enough ahead that no test clock reaches it.
pub const FAR_FUTURE_SECS: i64 = 4_000_000_000;

/// Unsigned JWT with the given payload.
pub fn make_jwt(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

/// Session for user `mock-user` signed in with `provider`.
pub fn sample_session(provider: &str, anonymous: bool) -> Session {
    Session {
        access_token: make_jwt(&json!({ "sub": "mock-user", "exp": FAR_FUTURE_SECS })),
        refresh_token: "mock-refresh".into(),
        expires_at: FAR_FUTURE_SECS,
        user: BackendUser {
            id: "mock-user".into(),
            email: Some("m@example.com".into()),
            is_anonymous: anonymous,
            app_metadata: AppMetadata {
                provider: Some(provider.to_string()),
            },
            user_metadata: json!({ "full_name": "Mock Person" }),
        },
    }
}

fn anonymous_session() -> Session {
    Session {
        access_token: make_jwt(&json!({ "sub": "mock-anon", "exp": FAR_FUTURE_SECS })),
        refresh_token: "anon-refresh".into(),
        expires_at: FAR_FUTURE_SECS,
        user: BackendUser {
            id: "mock-anon".into(),
            email: None,
            is_anonymous: true,
            app_metadata: AppMetadata {
                provider: Some("anonymous".into()),
            },
            user_metadata: json!({}),
        },
    }
}

pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Storage whose every operation fails.
pub struct FailingStorage;

#[async_trait]
impl KeyValueStorage for FailingStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        bail!("storage unavailable reading {}", key)
    }

    async fn set(&self, key: &str, _value: &str) -> Result<()> {
        bail!("storage unavailable writing {}", key)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        bail!("storage unavailable removing {}", key)
    }
}

#[derive(Default)]
struct MockState {
    current: Option<Session>,
    get_session_error: Option<BackendError>,
    oauth_error: Option<BackendError>,
    set_session_error: Option<BackendError>,
    anonymous_error: Option<BackendError>,
    sign_out_error: Option<BackendError>,
    password_result: Option<Result<Session, BackendError>>,
    sign_up_result: Option<Result<Option<Session>, BackendError>>,
    set_session_calls: Vec<(String, String)>,
    last_email: Option<String>,
}

/// Scriptable in-memory auth backend.
pub struct MockBackend {
    state: Mutex<MockState>,
    events: broadcast::Sender<AuthEvent>,
    get_session_calls: AtomicUsize,
    anonymous_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MockState::default()),
            events,
            get_session_calls: AtomicUsize::new(0),
            anonymous_calls: AtomicUsize::new(0),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_current_session(&self, session: Option<Session>) {
        self.with_state(|s| s.current = session);
    }

    pub fn fail_get_session(&self, err: BackendError) {
        self.with_state(|s| s.get_session_error = Some(err));
    }

    pub fn fail_oauth(&self, err: BackendError) {
        self.with_state(|s| s.oauth_error = Some(err));
    }

    pub fn fail_set_session(&self, err: BackendError) {
        self.with_state(|s| s.set_session_error = Some(err));
    }

    pub fn fail_anonymous(&self, err: BackendError) {
        self.with_state(|s| s.anonymous_error = Some(err));
    }

    pub fn fail_sign_out(&self, err: BackendError) {
        self.with_state(|s| s.sign_out_error = Some(err));
    }

    pub fn set_password_result(&self, result: Result<Session, BackendError>) {
        self.with_state(|s| s.password_result = Some(result));
    }

    pub fn set_sign_up_result(&self, result: Result<Option<Session>, BackendError>) {
        self.with_state(|s| s.sign_up_result = Some(result));
    }

    pub fn set_session_calls(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.set_session_calls.clone())
    }

    pub fn last_email(&self) -> Option<String> {
        self.with_state(|s| s.last_email.clone())
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn anonymous_calls(&self) -> usize {
        self.anonymous_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| match &s.get_session_error {
            Some(err) => Err(err.clone()),
            None => Ok(s.current.clone()),
        })
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        options: &OAuthOptions,
    ) -> Result<String, BackendError> {
        if let Some(err) = self.with_state(|s| s.oauth_error.clone()) {
            return Err(err);
        }
        let mut url = format!(
            "https://auth.example/authorize?provider={}&redirect_to={}",
            provider, options.redirect_to
        );
        for (key, value) in &options.query_params {
            url.push_str(&format!("&{}={}", key, value));
        }
        Ok(url)
    }

    async fn sign_in_anonymously(&self) -> Result<Session, BackendError> {
        self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| match &s.anonymous_error {
            Some(err) => Err(err.clone()),
            None => {
                let session = anonymous_session();
                s.current = Some(session.clone());
                Ok(session)
            }
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Session, BackendError> {
        self.with_state(|s| {
            s.last_email = Some(email.to_string());
            let result = s
                .password_result
                .clone()
                .unwrap_or_else(|| Err(BackendError::with_status(400, "Invalid login credentials")));
            if let Ok(session) = &result {
                s.current = Some(session.clone());
            }
            result
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _data: Value,
    ) -> Result<Option<Session>, BackendError> {
        self.with_state(|s| {
            s.last_email = Some(email.to_string());
            s.sign_up_result.clone().unwrap_or(Ok(None))
        })
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, BackendError> {
        self.with_state(|s| {
            s.set_session_calls
                .push((access_token.to_string(), refresh_token.to_string()));
            if let Some(err) = &s.set_session_error {
                return Err(err.clone());
            }
            let mut session = sample_session("google", false);
            session.access_token = access_token.to_string();
            session.refresh_token = refresh_token.to_string();
            s.current = Some(session.clone());
            Ok(session)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.with_state(|s| {
            s.current = None;
            match &s.sign_out_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        })
    }
}

/// Browser that returns a canned result and records what it was asked to open.
pub struct MockBrowser {
    result: BrowserResult,
    opened: Mutex<Vec<(String, String)>>,
}

impl MockBrowser {
    pub fn new(result: BrowserResult) -> Self {
        Self {
            result,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Last `(auth_url, redirect_uri)` pair opened.
    pub fn opened(&self) -> Option<(String, String)> {
        self.opened.lock().unwrap().last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthBrowser for MockBrowser {
    async fn open_auth_session(&self, url: &str, redirect_uri: &str) -> BrowserResult {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), redirect_uri.to_string()));
        self.result.clone()
    }
}
