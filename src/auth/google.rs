//! Google sign-in through the backend's OAuth endpoint
//!
//! ```text
//! Idle -> Requesting -> AwaitingBrowser -> Success | Cancelled | Failed
//!            \-----------------------------------------------/ (backend error)
//! ```
//!
//! Terminal states stay put; [`GoogleSignIn::reset`] is the only way back
//! to `Idle`.

use uuid::Uuid;

use super::browser::{AuthBrowser, BrowserResult};
use super::redirect;
use super::{AuthError, InstalledSession, SignInOutcome, TokenStore, GOOGLE_PROVIDER};
use crate::api::{AuthBackend, OAuthOptions};
use crate::config::InstallMode;
use crate::models::LoginType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleSignInState {
    Idle,
    Requesting,
    AwaitingBrowser,
    Success,
    Cancelled,
    Failed,
}

impl GoogleSignInState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoogleSignInState::Success | GoogleSignInState::Cancelled | GoogleSignInState::Failed
        )
    }
}

/// Authorization request parameters: a refresh token plus a fresh consent
/// screen every time.
fn google_query_params() -> Vec<(String, String)> {
    vec![
        ("access_type".to_string(), "offline".to_string()),
        ("prompt".to_string(), "consent".to_string()),
    ]
}

pub struct GoogleSignIn<'a> {
    backend: &'a dyn AuthBackend,
    browser: &'a dyn AuthBrowser,
    tokens: &'a TokenStore,
    redirect_uri: String,
    install_mode: InstallMode,
    state: GoogleSignInState,
    installed: Option<InstalledSession>,
}

impl<'a> GoogleSignIn<'a> {
    pub fn new(
        backend: &'a dyn AuthBackend,
        browser: &'a dyn AuthBrowser,
        tokens: &'a TokenStore,
        redirect_uri: String,
        install_mode: InstallMode,
    ) -> Self {
        Self {
            backend,
            browser,
            tokens,
            redirect_uri,
            install_mode,
            state: GoogleSignInState::Idle,
            installed: None,
        }
    }

    pub fn state(&self) -> GoogleSignInState {
        self.state
    }

    /// The session written by a successful run.
    pub fn installed(&self) -> Option<&InstalledSession> {
        self.installed.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = GoogleSignInState::Idle;
        self.installed = None;
    }

    fn transition(&mut self, next: GoogleSignInState) {
        tracing::debug!("Google sign-in: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: AuthError) -> SignInOutcome {
        tracing::warn!("Google sign-in failed: {}", error);
        self.transition(GoogleSignInState::Failed);
        SignInOutcome::Failed(error)
    }

    /// Run the flow once from `Idle`.
    pub async fn sign_in(&mut self) -> SignInOutcome {
        match self.authorize().await {
            Ok(redirect_url) => self.complete(&redirect_url).await,
            Err(outcome) => outcome,
        }
    }

    /// Request the authorization URL and wait for the browser session.
    ///
    /// Returns the redirect URL the browser landed on, or the outcome that
    /// ended the flow early. Nothing is installed by this step.
    pub async fn authorize(&mut self) -> Result<String, SignInOutcome> {
        if self.state != GoogleSignInState::Idle {
            tracing::warn!("Google sign-in started from {:?}, not Idle", self.state);
            return Err(SignInOutcome::Failed(AuthError::AuthenticationFailed));
        }

        self.transition(GoogleSignInState::Requesting);
        let options = OAuthOptions {
            redirect_to: self.redirect_uri.clone(),
            query_params: google_query_params(),
        };
        let auth_url = match self.backend.sign_in_with_oauth(GOOGLE_PROVIDER, &options).await {
            Ok(url) if !url.is_empty() => url,
            Ok(_) => return Err(self.fail(AuthError::NoRedirectUrl)),
            Err(e) => return Err(self.fail(AuthError::Backend(e))),
        };

        self.transition(GoogleSignInState::AwaitingBrowser);
        let result = self
            .browser
            .open_auth_session(&auth_url, &self.redirect_uri)
            .await;

        match result {
            BrowserResult::Success { url } => Ok(url),
            BrowserResult::Cancel => {
                tracing::info!("Google sign-in cancelled");
                self.transition(GoogleSignInState::Cancelled);
                Err(SignInOutcome::Cancelled)
            }
            BrowserResult::Other(kind) => {
                tracing::debug!("Browser session ended with {}", kind);
                Err(self.fail(AuthError::AuthenticationFailed))
            }
        }
    }

    /// Parse the redirect and install the session it carries.
    pub async fn complete(&mut self, redirect_url: &str) -> SignInOutcome {
        if self.state != GoogleSignInState::AwaitingBrowser {
            tracing::warn!("Google sign-in completed from {:?}", self.state);
            return SignInOutcome::Failed(AuthError::AuthenticationFailed);
        }

        let mut token = match redirect::extract(redirect_url) {
            Ok(token) => token,
            Err(e) => return self.fail(e.into()),
        };
        token.login_type = Some(LoginType::Google);

        let mut user_id = token.subject();

        if self.install_mode.sets_backend_session() {
            match self
                .backend
                .set_session(&token.access_token, &token.refresh_token)
                .await
            {
                Ok(session) => user_id = Some(session.user.id),
                Err(e) => return self.fail(AuthError::Backend(e)),
            }
        }

        if self.install_mode.writes_cache() {
            if let Err(e) = self.tokens.store(&token).await {
                tracing::warn!("Signed in but could not cache token: {:#}", e);
            }
        }

        let user_id = user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::info!("Google sign-in complete for {}", token.user_data.full_name);
        self.transition(GoogleSignInState::Success);

        let profile = token.user_data.clone();
        self.installed = Some(InstalledSession { user_id, token });
        SignInOutcome::Success(profile)
    }
}
