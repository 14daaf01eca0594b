//! Session reconciliation
//!
//! Startup priority, first match wins:
//!
//! 1. the backend's current session
//! 2. an unexpired cached [`AuthToken`]
//! 3. a fresh anonymous session
//!
//! Backend lookup errors are logged and fall through; they never reach the
//! UI. After startup, backend auth events keep the view current: `SIGNED_IN`
//! replaces everything, `SIGNED_OUT` clears memory and the cache.
//!
//! Every write of the view or the cache happens under `install_lock`, so
//! sign-in flows, events and startup never interleave their writes.

use std::sync::{Arc, Mutex, Weak};

use serde_json::json;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::browser::AuthBrowser;
use super::google::GoogleSignIn;
use super::{guest, AuthError, AuthToken, InstalledSession, SignInOutcome, TokenStore};
use crate::api::AuthBackend;
use crate::config::{AppConfig, InstallMode};
use crate::models::{AuthEvent, AuthState, LoginType, Session};

const MIN_PASSWORD_LEN: usize = 6;

pub struct SessionReconciler {
    backend: Arc<dyn AuthBackend>,
    tokens: Arc<TokenStore>,
    redirect_uri: String,
    install_mode: InstallMode,
    state: watch::Sender<AuthState>,
    started: OnceCell<()>,
    install_lock: tokio::sync::Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionReconciler {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        tokens: Arc<TokenStore>,
        config: &AppConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(AuthState::loading());
        Arc::new(Self {
            backend,
            tokens,
            redirect_uri: config.redirect_uri(),
            install_mode: config.install_mode,
            state,
            started: OnceCell::new(),
            install_lock: tokio::sync::Mutex::new(()),
            listener: Mutex::new(None),
        })
    }

    /// Snapshot of the current view.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Resolve the startup session and begin following backend events.
    ///
    /// Resolution runs once per reconciler; later calls return the current
    /// view immediately.
    pub async fn start(self: &Arc<Self>) -> AuthState {
        self.started
            .get_or_init(|| async {
                // Subscribe before resolving so nothing emitted meanwhile is lost.
                let events = self.backend.subscribe();
                self.resolve_startup().await;
                self.spawn_listener(events);
            })
            .await;
        self.state()
    }

    /// Stop following backend events.
    pub fn shutdown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn spawn_listener(self: &Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} auth events", missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.handle_event(event).await;
            }
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn resolve_startup(&self) {
        let _guard = self.install_lock.lock().await;

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                tracing::info!("Restored backend session");
                self.adopt_session(&session).await;
                return;
            }
            Ok(None) => tracing::debug!("No backend session"),
            Err(e) => tracing::warn!("Session lookup failed, trying fallbacks: {}", e),
        }

        if let Some(token) = self.tokens.get().await {
            tracing::info!("Using cached session for {}", token.user_data.full_name);
            self.adopt_cached(token);
            return;
        }

        match guest::sign_in_anonymously(self.backend.as_ref(), &self.tokens).await {
            Ok(installed) => self.adopt_installed(installed),
            Err(e) => {
                tracing::warn!("Guest fallback failed: {}", e);
                self.state.send_replace(AuthState::signed_out());
            }
        }
    }

    /// Apply one backend auth-state change.
    pub async fn handle_event(&self, event: AuthEvent) {
        tracing::debug!("Handling auth event {}", event.kind());
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                let _guard = self.install_lock.lock().await;
                self.adopt_session(&session).await;
            }
            AuthEvent::SignedOut => {
                let _guard = self.install_lock.lock().await;
                self.tokens.clear().await;
                self.state.send_replace(AuthState::signed_out());
            }
            AuthEvent::Other(_) => {}
        }
    }

    /// Take a backend session as the whole truth and mirror it to the cache.
    async fn adopt_session(&self, session: &Session) {
        let token = AuthToken::from_session(session);
        if let Err(e) = self.tokens.store(&token).await {
            tracing::warn!("Could not mirror session to cache: {:#}", e);
        }
        self.state.send_replace(AuthState::signed_in(
            session.profile(),
            session.user.id.clone(),
            Some(session.login_type()),
        ));
    }

    fn adopt_cached(&self, token: AuthToken) {
        // Display only; data calls take their user id from the token itself.
        let user_id = token
            .subject()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.state.send_replace(AuthState::signed_in(
            token.user_data,
            user_id,
            token.login_type,
        ));
    }

    fn adopt_installed(&self, installed: InstalledSession) {
        let InstalledSession { user_id, token } = installed;
        self.state.send_replace(AuthState::signed_in(
            token.user_data,
            user_id,
            token.login_type,
        ));
    }

    /// The browser wait runs without the install lock, so backend events
    /// keep flowing while the user is signing in.
    pub async fn sign_in_with_google(&self, browser: &dyn AuthBrowser) -> SignInOutcome {
        let mut flow = GoogleSignIn::new(
            self.backend.as_ref(),
            browser,
            &self.tokens,
            self.redirect_uri.clone(),
            self.install_mode,
        );
        let redirect_url = match flow.authorize().await {
            Ok(url) => url,
            Err(outcome) => return outcome,
        };

        let _guard = self.install_lock.lock().await;
        let outcome = flow.complete(&redirect_url).await;
        if let Some(installed) = flow.installed() {
            self.adopt_installed(installed.clone());
        }
        outcome
    }

    pub async fn sign_in_anonymously(&self) -> SignInOutcome {
        let _guard = self.install_lock.lock().await;

        match guest::sign_in_anonymously(self.backend.as_ref(), &self.tokens).await {
            Ok(installed) => {
                let profile = installed.token.user_data.clone();
                self.adopt_installed(installed);
                SignInOutcome::Success(profile)
            }
            Err(e) => SignInOutcome::Failed(e),
        }
    }

    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> SignInOutcome {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return SignInOutcome::Failed(AuthError::InvalidInput(
                "Please enter your email and password".to_string(),
            ));
        }

        let _guard = self.install_lock.lock().await;
        match self.backend.sign_in_with_password(email, password).await {
            Ok(session) => {
                self.adopt_session(&session).await;
                SignInOutcome::Success(session.profile())
            }
            Err(e) => {
                tracing::warn!("Email sign-in failed: {}", e);
                SignInOutcome::Failed(AuthError::Backend(e))
            }
        }
    }

    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> SignInOutcome {
        let email = email.trim();
        let full_name = full_name.trim();
        if email.is_empty() || password.is_empty() || full_name.is_empty() {
            return SignInOutcome::Failed(AuthError::InvalidInput(
                "Please fill in all fields".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return SignInOutcome::Failed(AuthError::InvalidInput(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            )));
        }

        let _guard = self.install_lock.lock().await;
        let data = json!({ "full_name": full_name });
        match self.backend.sign_up(email, password, data).await {
            Ok(Some(session)) => {
                self.adopt_session(&session).await;
                SignInOutcome::Success(session.profile())
            }
            Ok(None) => SignInOutcome::ConfirmationPending,
            Err(e) => {
                tracing::warn!("Sign-up failed: {}", e);
                SignInOutcome::Failed(AuthError::Backend(e))
            }
        }
    }

    /// Sign out everywhere. Local state is cleared even if the backend call
    /// fails; that failure is still returned.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _guard = self.install_lock.lock().await;

        let remote = self.backend.sign_out().await;
        self.tokens.clear().await;
        self.state.send_replace(AuthState::signed_out());

        remote.map_err(|e| {
            tracing::warn!("Backend sign-out failed: {}", e);
            AuthError::Backend(e)
        })
    }

    /// Login type of the current view, if signed in.
    pub fn login_type(&self) -> Option<LoginType> {
        self.state.borrow().login_type
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
