//! Runtime configuration: registry URLs and on-disk layout.
//!
//! Everything purr owns lives under one home directory:
//!
//! ```text
//! ~/.purr/
//!   settings.json      # optional overrides (see below)
//!   packages/<name>/   # source checkouts, each with purrconfig.json
//!   bin/               # staged executables and name-stable shims
//!   receipts/<name>.json
//! ```
//!
//! `settings.json` may set any of `registry_urls`, `github_api_url`,
//! `packages_dir` and `bin_dir`. `PURR_REGISTRY_URL` and `PURR_GITHUB_API_URL`
//! override the file.

use crate::error::{PurrError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGISTRY_URL: &str = "https://purr.finite.ovh/api/v1";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const SETTINGS_FILE: &str = "settings.json";

/// On-disk settings file; every field is optional
#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default, alias = "RepositoryUrls")]
    registry_urls: Vec<String>,
    #[serde(default)]
    github_api_url: Option<String>,
    #[serde(default)]
    packages_dir: Option<PathBuf>,
    #[serde(default)]
    bin_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Registry base URLs, tried in order
    pub registry_urls: Vec<String>,
    /// Base URL of the release API used for binary assets
    pub github_api_url: String,
    pub home: PathBuf,
    pub packages_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub receipts_dir: PathBuf,
    pub request_timeout: Duration,
    pub redirect_timeout: Duration,
}

impl Config {
    /// Load configuration from the default home directory and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_home(detect_home())?;

        if let Ok(url) = std::env::var("PURR_REGISTRY_URL")
            && !url.trim().is_empty()
        {
            config.registry_urls = vec![url.trim().to_string()];
        }
        if let Ok(url) = std::env::var("PURR_GITHUB_API_URL")
            && !url.trim().is_empty()
        {
            config.github_api_url = url.trim().to_string();
        }

        Ok(config)
    }

    /// Build a configuration rooted at `home`, reading `home/settings.json`
    /// if it exists. Environment overrides are not applied.
    pub fn from_home(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let settings = read_settings(&home.join(SETTINGS_FILE))?;

        let registry_urls = if settings.registry_urls.is_empty() {
            vec![DEFAULT_REGISTRY_URL.to_string()]
        } else {
            settings.registry_urls
        };

        Ok(Self {
            registry_urls,
            github_api_url: settings
                .github_api_url
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            packages_dir: settings
                .packages_dir
                .unwrap_or_else(|| home.join("packages")),
            bin_dir: settings.bin_dir.unwrap_or_else(|| home.join("bin")),
            receipts_dir: home.join("receipts"),
            home,
            request_timeout: Duration::from_secs(30),
            redirect_timeout: Duration::from_secs(10),
        })
    }
}

fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    tracing::debug!("reading settings from {}", path.display());

    let contents = std::fs::read_to_string(path)
        .map_err(|e| PurrError::fs(format!("Failed to read {}", path.display()), e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Detect the purr home directory
pub fn detect_home() -> PathBuf {
    if let Ok(home) = std::env::var("PURR_HOME")
        && !home.is_empty()
    {
        return PathBuf::from(home);
    }

    user_home().join(".purr")
}

fn user_home() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var(var)
        .or_else(|_| std::env::var("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
