//! CLI entry points for sign-in, sign-out and session inspection

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{SignInOutcome, SystemBrowser};
use crate::api::AuthBackend;
use crate::models::{AuthState, LoginType};
use crate::runtime::Runtime;

/// Print a sign-in outcome. Cancellation is reported, not raised.
fn report(outcome: SignInOutcome) -> Result<()> {
    match outcome {
        SignInOutcome::Success(user) => {
            if user.email.is_empty() {
                println!("Signed in as {}.", user.full_name);
            } else {
                println!("Signed in as {} <{}>.", user.full_name, user.email);
            }
            Ok(())
        }
        SignInOutcome::Cancelled => {
            println!("Sign-in cancelled.");
            Ok(())
        }
        SignInOutcome::ConfirmationPending => {
            println!("Account created. Check your email to confirm it, then run 'photoshare login --email'.");
            Ok(())
        }
        SignInOutcome::Failed(e) => bail!("Sign-in failed: {}", e),
    }
}

async fn prompt(label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
        .unwrap_or_default();
    Ok(line.trim_end_matches('\r').to_string())
}

/// Name of the non-guest account already signed in, if any.
async fn existing_account(rt: &Runtime) -> Option<String> {
    match rt.backend.get_session().await {
        Ok(Some(session)) if session.login_type() != LoginType::Guest => {
            return Some(session.profile().full_name);
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("Backend session unavailable: {}", e),
    }
    rt.tokens
        .get()
        .await
        .filter(|t| t.login_type != Some(LoginType::Guest))
        .map(|t| t.user_data.full_name)
}

/// Sign in with Google, or with email and password when `email` is given.
pub async fn login(force: bool, email: Option<String>, password: Option<String>) -> Result<()> {
    let rt = Runtime::connect()?;

    if !force {
        if let Some(name) = existing_account(&rt).await {
            println!("Already signed in as {}. Use --force to sign in again.", name);
            return Ok(());
        }
    }

    let outcome = match email {
        Some(email) => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ").await?,
            };
            rt.reconciler.sign_in_with_email(&email, &password).await
        }
        None => {
            tracing::info!("Starting Google sign-in...");
            rt.reconciler.sign_in_with_google(&SystemBrowser).await
        }
    };
    rt.reconciler.shutdown();
    report(outcome)
}

/// Create an email account.
pub async fn signup(email: &str, password: Option<String>, name: &str) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password (at least 6 characters): ").await?,
    };

    let rt = Runtime::connect()?;
    let outcome = rt.reconciler.sign_up_with_email(email, &password, name).await;
    rt.reconciler.shutdown();
    report(outcome)
}

/// Continue without an account.
pub async fn guest_login() -> Result<()> {
    let rt = Runtime::connect()?;
    let outcome = rt.reconciler.sign_in_anonymously().await;
    rt.reconciler.shutdown();
    report(outcome)
}

/// Sign out and clear cached credentials
pub async fn logout() -> Result<()> {
    let rt = Runtime::connect()?;
    if let Err(e) = rt.reconciler.sign_out().await {
        eprintln!("Warning: backend sign-out failed ({}); local credentials cleared.", e);
    }
    rt.reconciler.shutdown();
    println!("Logged out.");
    Ok(())
}

/// Display session and cache status without creating a session.
pub async fn status() -> Result<()> {
    let rt = Runtime::connect()?;

    println!("Backend:     {}", rt.config.backend_url);
    println!("Install:     {:?}", rt.config.install_mode);

    match rt.backend.get_session().await {
        Ok(Some(session)) => {
            println!("Session:     active ({})", session.login_type());
            println!("  user_id:   {}", session.user.id);
            println!("  expires:   {}", format_millis(session.expires_at.saturating_mul(1000)));
        }
        Ok(None) => println!("Session:     none"),
        Err(e) => println!("Session:     unavailable ({})", e),
    }

    match rt.tokens.get().await {
        Some(token) => {
            let kind = token
                .login_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Cached:      valid ({})", kind);
            println!("  expires:   {}", format_millis(token.expires_at));
            if let Some(profile) = rt.tokens.user_data().await {
                println!("  profile:   {}", profile.full_name);
            }
        }
        None => println!("Cached:      none"),
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn print_state(state: &AuthState) {
    if state.is_loading {
        println!("Loading...");
        return;
    }
    match (&state.user, state.is_authenticated) {
        (Some(user), true) => {
            let kind = state
                .login_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Name:       {}", user.full_name);
            if !user.email.is_empty() {
                println!("Email:      {}", user.email);
            }
            if let Some(id) = &state.user_id {
                println!("User ID:    {}", id);
            }
            println!("Login type: {}", kind);
        }
        _ => println!("Not signed in."),
    }
}

/// Show the current user after startup reconciliation.
pub async fn whoami() -> Result<()> {
    let rt = Runtime::connect()?;
    let state = rt.reconciler.start().await;
    rt.reconciler.shutdown();
    print_state(&state);
    Ok(())
}

/// Print auth-state changes until interrupted.
pub async fn watch() -> Result<()> {
    let rt = Runtime::connect()?;
    let mut rx = rt.reconciler.subscribe();
    rt.reconciler.start().await;

    println!("Watching auth state (Ctrl-C to stop)");
    print_state(&rx.borrow_and_update());
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_state(&rx.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    rt.reconciler.shutdown();
    Ok(())
}
