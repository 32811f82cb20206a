//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (WAYFARER_*)
//! - TOML configuration file
//! - `--config <path>` on the command line

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wayfarer_core::Identity;
use wayfarer_transport::{ReconnectPolicy, WebSocketConfig};

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hub connection settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// Who we are.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Where the session is persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reconnect behavior.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Hub connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base address; the viewer id is appended as the last path segment.
    #[serde(default = "default_hub_url")]
    pub base_url: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Identity as supplied by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Stable user id.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Display name.
    #[serde(default = "default_user_name")]
    pub name: String,

    /// Room the provider believes the user is in.
    #[serde(default = "default_location")]
    pub location: Option<String>,
}

/// Session storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the session record. `~` is expanded.
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect after abnormal closes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First reconnect delay in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Give up after this many consecutive failures.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_hub_url() -> String {
    std::env::var("WAYFARER_HUB_URL").unwrap_or_else(|_| "ws://127.0.0.1:9080/players".to_string())
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_user_id() -> String {
    std::env::var("WAYFARER_USER_ID").unwrap_or_else(|_| "anonymous".to_string())
}

fn default_user_name() -> String {
    std::env::var("WAYFARER_USER_NAME").unwrap_or_else(|_| "Anonymous".to_string())
}

fn default_location() -> Option<String> {
    std::env::var("WAYFARER_LOCATION").ok()
}

fn default_storage_dir() -> String {
    std::env::var("WAYFARER_STORAGE_DIR").unwrap_or_else(|_| "~/.local/state/wayfarer".to_string())
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000 // 30 seconds
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: default_hub_url(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            name: default_user_name(),
            location: default_location(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or the first default path that
    /// exists, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let config_paths = [
            "wayfarer.toml",
            "/etc/wayfarer/wayfarer.toml",
            "~/.config/wayfarer/wayfarer.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Build the viewer identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.name.clone(),
            location: self.identity.location.clone(),
        }
    }

    /// Get the storage directory with `~` expanded.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.dir).as_ref())
    }

    /// Get the reconnect policy.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnect.enabled,
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
        }
    }

    /// Get the WebSocket transport config for `url`.
    #[must_use]
    pub fn websocket_config(&self, url: String) -> WebSocketConfig {
        WebSocketConfig {
            url,
            max_message_size: self.hub.max_message_size,
            reconnect: self.reconnect_policy(),
            await_handshake: true,
        }
    }
}
