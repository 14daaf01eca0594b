//! Anonymous (guest) sign-in

use super::{AuthError, AuthToken, InstalledSession, TokenStore};
use crate::api::AuthBackend;
use crate::models::{LoginType, UserProfile};

/// Request a throwaway identity and install it like any other session.
///
/// The profile is always the guest placeholder regardless of what the
/// backend attaches to the anonymous user.
pub async fn sign_in_anonymously(
    backend: &dyn AuthBackend,
    tokens: &TokenStore,
) -> Result<InstalledSession, AuthError> {
    let session = backend.sign_in_anonymously().await?;

    let token = AuthToken {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at.saturating_mul(1000),
        user_data: UserProfile::guest(),
        login_type: Some(LoginType::Guest),
    };
    if let Err(e) = tokens.store(&token).await {
        tracing::warn!("Guest session not cached: {:#}", e);
    }

    tracing::info!("Signed in as guest");
    Ok(InstalledSession {
        user_id: session.user.id,
        token,
    })
}
