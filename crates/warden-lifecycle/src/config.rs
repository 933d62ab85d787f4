//! Lifecycle configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use warden_core::{
    DEFAULT_LOCK_DELAY_SECS, DEFAULT_REFRESH_BUFFER_SECS, DEFAULT_SESSION_TIMEOUT_SECS,
    DEFAULT_STORAGE_NAMESPACE, DEFAULT_UNLOCK_REASON,
};

use crate::error::LifecycleError;

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "WARDEN_CONFIG";

/// Lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Inactivity timeout (seconds)
    pub session_timeout_secs: u64,

    /// How long before credential expiry a refresh becomes due (seconds)
    pub refresh_buffer_secs: u64,

    /// Background time required before locking on foreground (seconds)
    pub lock_delay_secs: u64,

    /// Reason shown by the authenticator when unlocking
    pub unlock_reason: String,

    /// Secure storage namespace for credentials
    pub storage_namespace: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            lock_delay_secs: DEFAULT_LOCK_DELAY_SECS,
            unlock_reason: DEFAULT_UNLOCK_REASON.to_string(),
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Short timeout, immediate lock, early refresh
    pub fn strict() -> Self {
        Self {
            session_timeout_secs: 120,
            refresh_buffer_secs: 300,
            lock_delay_secs: 0,
            ..Self::default()
        }
    }

    /// Relaxed settings for local development
    pub fn development() -> Self {
        Self {
            session_timeout_secs: 3600,
            refresh_buffer_secs: 60,
            lock_delay_secs: 300,
            storage_namespace: format!("{}.dev", DEFAULT_STORAGE_NAMESPACE),
            ..Self::default()
        }
    }

    /// Look up a named profile (`default`, `strict`, `development`)
    pub fn profile(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "strict" => Some(Self::strict()),
            "development" | "dev" => Some(Self::development()),
            _ => None,
        }
    }

    /// Inactivity timeout
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Refresh buffer
    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    /// Lock delay
    pub fn lock_delay(&self) -> Duration {
        Duration::from_secs(self.lock_delay_secs)
    }

    /// Check values that would make the lifecycle unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.unlock_reason.trim().is_empty() {
            return Err(LifecycleError::Config(
                "unlock_reason must not be empty".to_string(),
            ));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(LifecycleError::Config(
                "storage_namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the configuration file path
    ///
    /// `WARDEN_CONFIG` wins; otherwise `warden/config.json` under the
    /// platform config directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("config.json")
    }
}
