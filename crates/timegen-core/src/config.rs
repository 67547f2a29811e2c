//! Configuration management for TimeGen.
//!
//! Loads configuration from ${TIMEGEN_HOME}/config.toml with sensible defaults.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Production API host used when nothing else is configured.
pub const DEFAULT_API_HOST: &str = "https://timegen.onrender.com";

/// Path prefix every API base must end with.
const API_PREFIX: &str = "/api";

/// Environment variable overriding the API base URL.
pub const API_BASE_ENV: &str = "TIMEGEN_API_BASE";

/// Standard User-Agent header for TimeGen API requests.
pub const USER_AGENT: &str = concat!("timegen/", env!("CARGO_PKG_VERSION"));

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for TimeGen configuration and data files.
    //!
    //! TIMEGEN_HOME resolution order:
    //! 1. TIMEGEN_HOME environment variable (if set)
    //! 2. ~/.config/timegen (default)

    use std::path::PathBuf;

    /// Returns the TimeGen home directory.
    pub fn timegen_home() -> PathBuf {
        if let Ok(home) = std::env::var("TIMEGEN_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".timegen"),
            |h| h.join(".config").join("timegen"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        timegen_home().join("config.toml")
    }

    /// Returns the path to the persisted session.
    pub fn session_path() -> PathBuf {
        timegen_home().join("session.json")
    }

    /// Returns the path to the persisted cookie jar.
    pub fn cookies_path() -> PathBuf {
        timegen_home().join("cookies.json")
    }
}

/// How the gateway handles renewals triggered by concurrently failing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenewalPolicy {
    /// Requests rejected with the same stale credential share one refresh call.
    #[default]
    Coalesce,
    /// Every rejected request issues its own refresh call.
    Independent,
}

impl fmt::Display for RenewalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewalPolicy::Coalesce => f.write_str("coalesce"),
            RenewalPolicy::Independent => f.write_str("independent"),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API base URL (host, or host with `/api`)
    pub api_base: Option<String>,

    /// Renewal coordination for concurrent 401s
    pub renewal: RenewalPolicy,

    /// Optional User-Agent override
    pub user_agent: Option<String>,
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Returns the effective User-Agent.
    pub fn effective_user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(USER_AGENT)
    }

    /// Resolves the API base with precedence: flag > env > config > default.
    pub fn api_base(&self, flag: Option<&str>) -> Result<ApiBase> {
        let env = std::env::var(API_BASE_ENV).ok();
        resolve_api_base(flag, env.as_deref(), self.api_base.as_deref())
    }
}

/// Picks the first non-empty candidate and normalizes it.
pub fn resolve_api_base(
    flag: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> Result<ApiBase> {
    let raw = [flag, env, config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_API_HOST);
    ApiBase::parse(raw)
}

/// Normalized API base URL, always ending in `/api` with no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    base: String,
}

impl ApiBase {
    /// Normalizes and validates a base URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let host = raw.trim().trim_end_matches('/');
        let base = if host.ends_with(API_PREFIX) {
            host.to_string()
        } else {
            format!("{host}{API_PREFIX}")
        };

        let url = Url::parse(&base).with_context(|| format!("Invalid API base URL: {raw}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Invalid API base URL: {raw} (expected http or https)");
        }

        Ok(Self { base })
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// The base without the `/api` prefix.
    pub fn host(&self) -> &str {
        self.base.strip_suffix(API_PREFIX).unwrap_or(&self.base)
    }

    /// Joins an endpoint path (leading slash optional) onto the base.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}/{}", self.base, path.trim_start_matches('/')))
    }

    /// True when this points at the production deployment.
    pub fn is_production(&self) -> bool {
        self.host() == DEFAULT_API_HOST
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}
