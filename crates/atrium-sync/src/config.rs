//! # Store Configuration
//!
//! Configuration for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ATRIUM_API_URL=https://api.example.com                             │
//! │     ATRIUM_CACHE_MAX_AGE_SECS=120                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/atrium/store.toml (Linux)                                │
//! │     ~/Library/Application Support/dev.atrium.app/store.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     max_age 300s, request timeout 30s                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # store.toml
//! [api]
//! base_url = "https://api.example.com"
//! request_timeout_secs = 30
//!
//! [cache]
//! max_age_secs = 300
//!
//! [session]
//! persist = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// API Settings
// =============================================================================

/// Settings for the backend API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the REST backend (no trailing slash required).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds). A timeout classifies as
    /// NetworkUnreachable.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiSettings {
    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Settings for cache freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Freshness window (seconds): a populated entry younger than this is
    /// served without a network call.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

fn default_max_age() -> u64 {
    atrium_core::DEFAULT_MAX_AGE.as_secs()
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            max_age_secs: default_max_age(),
        }
    }
}

impl CacheSettings {
    /// Freshness window as a Duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Settings for session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Persist credentials so a restart can restore the session.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Override for the credential file location. Defaults to the platform
    /// config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            persist: true,
            credentials_path: None,
        }
    }
}

// =============================================================================
// Main Store Configuration
// =============================================================================

/// Complete sync-store configuration.
///
/// ## Example Config File
/// ```toml
/// [api]
/// base_url = "https://api.example.com"
/// request_timeout_secs = 30
///
/// [cache]
/// max_age_secs = 300
///
/// [session]
/// persist = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend API settings.
    #[serde(default)]
    pub api: ApiSettings,

    /// Cache freshness settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Session persistence settings.
    #[serde(default)]
    pub session: SessionSettings,
}

impl StoreConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (store.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Default config file path via the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "atrium", "atrium")
            .map(|dirs| dirs.config_dir().join("store.toml"))
    }

    /// Applies `ATRIUM_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ATRIUM_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(secs) = std::env::var("ATRIUM_REQUEST_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.api.request_timeout_secs = parsed;
            }
        }
        if let Ok(secs) = std::env::var("ATRIUM_CACHE_MAX_AGE_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.cache.max_age_secs = parsed;
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        let parsed = url::Url::parse(&self.api.base_url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(StoreError::InvalidConfig(format!(
                    "Unsupported base_url scheme: '{}'. Use http or https",
                    other
                )));
            }
        }
        if self.api.request_timeout_secs == 0 {
            return Err(StoreError::InvalidConfig(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
