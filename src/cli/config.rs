//! Configuration file handling for the CLI
//!
//! Settings come from command line flags, then the configuration file
//! (`~/.config/gitlab-token-manager/config.toml`), then environment
//! variables, then built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::tokens::DEFAULT_LIFETIME_DAYS;

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const GITLAB_URL_ENV: &str = "GITLAB_URL";
pub const GITLAB_ADMIN_TOKEN_URL_ENV: &str = "GITLAB_ADMIN_TOKEN_URL";

/// CLI configuration stored in ~/.config/gitlab-token-manager/config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// GitLab instance URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Secret reference holding the admin token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token_url: Option<String>,

    /// Token lifetime in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    /// Directory for rescue files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue_dir: Option<PathBuf>,

    /// Timeout in seconds for API calls and secret store commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CliConfig {
    /// Default configuration file path, honouring `XDG_CONFIG_HOME`
    pub fn config_path() -> Result<PathBuf> {
        let base = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME")
                    .or_else(|_| std::env::var("USERPROFILE"))
                    .context("Unable to determine home directory")?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join(env!("CARGO_PKG_NAME")).join("config.toml"))
    }

    /// Load the file named by `--config`, or the default file if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_path(path)?
                .with_context(|| format!("Config file not found: {}", path.display())),
            None => Ok(Self::load_from_path(&Self::config_path()?)?.unwrap_or_default()),
        }
    }

    /// Load configuration from a specific path, `None` when it does not exist
    pub fn load_from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(Some(config))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve and validate the GitLab base URL
///
/// 1. --url flag
/// 2. config file
/// 3. GITLAB_URL environment variable
/// 4. Default: https://gitlab.com
///
/// The URL must use https and name a host. `allow_http` also accepts http.
pub fn resolve_base_url(url_flag: Option<String>, config: &CliConfig, allow_http: bool) -> Result<Url> {
    let raw = if let Some(url) = url_flag {
        debug!("Using GitLab URL from --url flag: {}", url);
        url
    } else if let Some(url) = config.url.clone().filter(|u| !u.is_empty()) {
        debug!("Using GitLab URL from config file: {}", url);
        url
    } else if let Some(url) = non_empty_env(GITLAB_URL_ENV) {
        debug!("Using GitLab URL from {} environment variable: {}", GITLAB_URL_ENV, url);
        url
    } else {
        debug!("Using default GitLab URL: {}", DEFAULT_GITLAB_URL);
        DEFAULT_GITLAB_URL.to_string()
    };

    let url = Url::parse(&raw).with_context(|| format!("Invalid GitLab URL: {}", raw))?;
    let scheme_ok = url.scheme() == "https" || (allow_http && url.scheme() == "http");
    if !scheme_ok || url.host_str().map_or(true, str::is_empty) {
        anyhow::bail!("A valid https GitLab URL must be provided, got {}", raw);
    }
    Ok(url)
}

/// Resolve the admin token reference URL
///
/// 1. --admin-token-url flag
/// 2. config file
/// 3. GITLAB_ADMIN_TOKEN_URL environment variable
pub fn resolve_admin_token_url(flag: Option<String>, config: &CliConfig) -> Option<String> {
    if let Some(url) = flag.filter(|u| !u.is_empty()) {
        debug!("Using admin token reference from --admin-token-url flag");
        return Some(url);
    }
    if let Some(url) = config.admin_token_url.clone().filter(|u| !u.is_empty()) {
        debug!("Using admin token reference from config file");
        return Some(url);
    }
    let url = non_empty_env(GITLAB_ADMIN_TOKEN_URL_ENV);
    if url.is_some() {
        debug!("Using admin token reference from {} environment variable", GITLAB_ADMIN_TOKEN_URL_ENV);
    }
    url
}

/// Resolve the token lifetime in days (flag, config file, default 30)
pub fn resolve_duration(flag: Option<i64>, config: &CliConfig) -> i64 {
    flag.or(config.duration).unwrap_or(DEFAULT_LIFETIME_DAYS)
}

/// Resolve the request timeout (flag, config file, default 30 seconds)
pub fn resolve_timeout(flag: Option<u64>, config: &CliConfig) -> Duration {
    Duration::from_secs(flag.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS))
}

/// Resolve the rescue file directory (config file, else the system temp dir)
pub fn resolve_rescue_dir(config: &CliConfig) -> PathBuf {
    config.rescue_dir.clone().unwrap_or_else(std::env::temp_dir)
}
