//! Configuration and persistent storage

pub mod storage;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

const ENV_BACKEND_URL: &str = "PHOTOSHARE_BACKEND_URL";
const ENV_ANON_KEY: &str = "PHOTOSHARE_ANON_KEY";

/// How a successful browser sign-in installs its session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// Only write the local token cache.
    Cache,
    /// Only hand the token pair to the backend client.
    Backend,
    /// Both of the above.
    #[default]
    Both,
}

impl InstallMode {
    pub fn writes_cache(self) -> bool {
        matches!(self, InstallMode::Cache | InstallMode::Both)
    }

    pub fn sets_backend_session(self) -> bool {
        matches!(self, InstallMode::Backend | InstallMode::Both)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the hosted auth/database service
    pub backend_url: String,
    /// Public API key sent with every backend request
    pub anon_key: String,
    /// App URL scheme the OAuth provider redirects back to
    pub redirect_scheme: String,
    pub install_mode: InstallMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            redirect_scheme: "photosharing".to_string(),
            install_mode: InstallMode::default(),
        }
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "photoshare", "photoshare")
        .context("Could not determine config directory")
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the API key)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.is_empty()) {
            self.backend_url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.anon_key = key;
        }
    }

    /// Fail early with a useful message when the backend is not configured.
    pub fn ensure_backend(&self) -> Result<()> {
        anyhow::ensure!(
            !self.backend_url.is_empty(),
            "backend_url is not configured. Set {} or edit {}.",
            ENV_BACKEND_URL,
            Self::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.toml".to_string())
        );
        anyhow::ensure!(
            !self.anon_key.is_empty(),
            "anon_key is not configured. Set {}.",
            ENV_ANON_KEY
        );
        Ok(())
    }

    /// Apply the given settings and persist them.
    pub fn update(
        &mut self,
        backend_url: Option<String>,
        anon_key: Option<String>,
        install_mode: Option<InstallMode>,
    ) -> Result<()> {
        if let Some(url) = backend_url {
            self.backend_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = anon_key {
            self.anon_key = key;
        }
        if let Some(mode) = install_mode {
            self.install_mode = mode;
        }
        self.save()
    }

    /// Redirect target registered with the OAuth provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}://auth/callback", self.redirect_scheme)
    }
}
