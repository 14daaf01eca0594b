//! System browser authentication session
//!
//! On a phone the OS hands the redirect back to the app. A terminal has no
//! URL scheme handler, so the user pastes the URL the browser ended up on.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Terminal result of a browser authentication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserResult {
    /// The browser reached the redirect URI; `url` is the full redirect.
    Success { url: String },
    /// The user dismissed the session.
    Cancel,
    /// Anything else (the string names what happened).
    Other(String),
}

#[async_trait]
pub trait AuthBrowser: Send + Sync {
    /// Open `url` and wait, unbounded, until the session reaches
    /// `redirect_uri` or is dismissed.
    async fn open_auth_session(&self, url: &str, redirect_uri: &str) -> BrowserResult;
}

pub struct SystemBrowser;

#[async_trait]
impl AuthBrowser for SystemBrowser {
    async fn open_auth_session(&self, url: &str, redirect_uri: &str) -> BrowserResult {
        if let Err(e) = open::that(url) {
            tracing::warn!("Could not launch a browser: {}", e);
        }

        println!();
        println!("To sign in, visit: {}", url);
        println!();
        println!("After signing in, paste the address you were sent to");
        println!("(it starts with {}), or press Enter to cancel:", redirect_uri);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => classify_redirect(&line, redirect_uri),
            Ok(None) => BrowserResult::Cancel,
            Err(e) => BrowserResult::Other(format!("failed to read redirect: {}", e)),
        }
    }
}

/// Interpret what the user pasted back.
pub fn classify_redirect(input: &str, redirect_uri: &str) -> BrowserResult {
    let input = input.trim();
    if input.is_empty() {
        BrowserResult::Cancel
    } else if input.starts_with(redirect_uri) {
        BrowserResult::Success {
            url: input.to_string(),
        }
    } else {
        BrowserResult::Other("unexpected redirect target".to_string())
    }
}
