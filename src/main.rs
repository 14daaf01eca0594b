//! Photoshare CLI - terminal client for the photo-sharing events service
//!
//! Sign in with Google, email or as a guest, then create, join and share
//! photo events from the terminal.

mod api;
mod auth;
mod config;
mod models;
mod runtime;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, InstallMode};

#[derive(Parser)]
#[command(name = "photoshare")]
#[command(about = "Terminal client for the photo-sharing events service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with Google (or with email and password)
    Login {
        /// Sign in again even if an account is already signed in
        #[arg(short, long)]
        force: bool,

        /// Sign in with this email address instead of Google
        #[arg(short, long)]
        email: Option<String>,

        /// Password for --email (prompted if omitted)
        #[arg(short, long, requires = "email")]
        password: Option<String>,
    },

    /// Create an account with email and password
    Signup {
        #[arg(short, long)]
        email: String,

        /// Password (prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Full name shown to other event members
        #[arg(short, long)]
        name: String,
    },

    /// Continue as a guest
    Guest,

    /// Sign out and clear cached credentials
    Logout,

    /// Show backend session and cached token status
    Status,

    /// Show the current user
    Whoami,

    /// List your events
    Events,

    /// Create a new event
    CreateEvent {
        /// Event name
        name: String,
    },

    /// Join an event by id or share link
    Join {
        /// Event id or photosharing://events/<id>/join link
        target: String,
    },

    /// List the photos in an event
    Photos {
        /// Event id (from `events` output)
        event_id: String,
    },

    /// Print the share link for an event
    Share {
        /// Event id (from `events` output)
        event_id: String,
    },

    /// Follow auth-state changes until Ctrl-C
    Watch,

    /// Show or change backend settings
    Config {
        /// Base URL of the auth/database service
        #[arg(long)]
        backend_url: Option<String>,

        /// Public API key for the service
        #[arg(long)]
        anon_key: Option<String>,

        /// How browser sign-in installs its session
        #[arg(long, value_enum)]
        install_mode: Option<InstallMode>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            force,
            email,
            password,
        } => {
            auth::login(force, email, password).await?;
        }
        Commands::Signup {
            email,
            password,
            name,
        } => {
            auth::signup(&email, password, &name).await?;
        }
        Commands::Guest => {
            auth::guest_login().await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            auth::whoami().await?;
        }
        Commands::Events => {
            tracing::info!("Fetching events...");
            api::list_events().await?;
        }
        Commands::CreateEvent { name } => {
            api::create_event(&name).await?;
        }
        Commands::Join { target } => {
            api::join(&target).await?;
        }
        Commands::Photos { event_id } => {
            api::photos(&event_id).await?;
        }
        Commands::Share { event_id } => {
            api::share(&event_id).await?;
        }
        Commands::Watch => {
            auth::watch().await?;
        }
        Commands::Config {
            backend_url,
            anon_key,
            install_mode,
        } => {
            let mut config = AppConfig::load()?;
            if backend_url.is_none() && anon_key.is_none() && install_mode.is_none() {
                println!("backend_url:  {}", config.backend_url);
                println!(
                    "anon_key:     {}",
                    if config.anon_key.is_empty() { "unset" } else { "set" }
                );
                println!("redirect_uri: {}", config.redirect_uri());
                println!("install_mode: {:?}", config.install_mode);
            } else {
                config.update(backend_url, anon_key, install_mode)?;
                println!("Configuration saved.");
            }
        }
    }

    Ok(())
}
