//! Configuration management for apiwire.
//!
//! Loads settings from `~/.config/apiwire/config.toml` with environment overrides.

pub use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Authentication defaults (single source of truth)
pub const DEFAULT_LOGIN_PATH: &str = "auth/login";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_MAX_REAUTH_RETRIES: u32 = 2;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL that service names are appended to. Required.
    #[serde(default)]
    pub base_url: String,
    /// Re-authentication endpoint, absolute or relative to `base_url`.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Application route the session observer navigates to on teardown.
    #[serde(default = "default_login_route")]
    pub login_route: String,
    /// Path fragments exempt from 401-triggered re-authentication.
    #[serde(default = "default_public_endpoints")]
    pub public_endpoints: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_reauth_retries")]
    pub max_reauth_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

// Default value functions
fn default_login_path() -> String { DEFAULT_LOGIN_PATH.to_string() }
fn default_login_route() -> String { DEFAULT_LOGIN_ROUTE.to_string() }
fn default_public_endpoints() -> Vec<String> { vec!["/".to_string()] }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_reauth_retries() -> u32 { DEFAULT_MAX_REAUTH_RETRIES }
fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apiwire")
        .join("session.json")
}
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_cache_capacity() -> u64 { 1000 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_path: default_login_path(),
            login_route: default_login_route(),
            public_endpoints: default_public_endpoints(),
            timeout_secs: default_timeout_secs(),
            max_reauth_retries: default_max_reauth_retries(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_capacity: default_cache_capacity(),
        }
    }
}

impl ApiConfig {
    /// Fully-qualified login URL. Absolute `login_path` values are used as-is.
    pub fn login_url(&self) -> String {
        if self.login_path.starts_with("http://") || self.login_path.starts_with("https://") {
            return self.login_path.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.login_path.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apiwire")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("APIWIRE_API_ENDPOINT") {
            self.api.base_url = url;
        }
        if let Ok(path) = std::env::var("APIWIRE_LOGIN_PATH") {
            self.api.login_path = path;
        }
        if let Ok(val) = std::env::var("APIWIRE_MAX_REAUTH_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.api.max_reauth_retries = retries;
            }
        }
        if let Ok(path) = std::env::var("APIWIRE_SESSION_FILE") {
            self.storage.path = PathBuf::from(path);
        }
        self
    }

    /// Reject configurations the client cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}
