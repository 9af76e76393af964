//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `FIELDKIT_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/fieldkit/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and defaults are
//! used. Secrets can additionally be supplied through `FIELDKIT_API_KEY` and
//! `FIELDKIT_ENDPOINT`, which override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "FIELDKIT_CONFIG";
/// Environment variable overriding `remote.api_key`
pub const API_KEY_ENV_VAR: &str = "FIELDKIT_API_KEY";
/// Environment variable overriding `remote.endpoint`
pub const ENDPOINT_ENV_VAR: &str = "FIELDKIT_ENDPOINT";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub remote: RemoteConfig,
    pub prediction: PredictionConfig,
    pub binding: BindingConfig,
    pub check: CheckConfig,
    pub capabilities: CapabilityConfig,
    pub logging: LoggingConfig,
    pub events: EventConfig,
}

/// Remote validation service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Value sent in `X-Auth-Key`
    pub api_key: Option<String>,
    /// Value sent in `X-Agent`
    pub agent: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// JSON-RPC error code signalling a stale session token
    pub session_expired_code: i64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/rpc".to_string(),
            api_key: None,
            agent: format!("fieldkit/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
            session_expired_code: -32001,
        }
    }
}

/// Autocomplete settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Debounce between the last keystroke and the lookup
    pub debounce_ms: u64,
    /// Maximum predictions kept per response
    pub max_items: usize,
    /// Resolve a lone, near-identical prediction without a dropdown
    pub smart_fill: bool,
    /// Maximum edit distance for smart fill
    pub smart_fill_distance: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_items: 6,
            smart_fill: true,
            smart_fill_distance: 1,
        }
    }
}

impl PredictionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Polling periods for bound UI elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub change_poll_ms: u64,
    pub input_poll_ms: u64,
    pub blur_poll_ms: u64,
    pub liveness_poll_ms: u64,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            change_poll_ms: 300,
            input_poll_ms: 10,
            blur_poll_ms: 10,
            liveness_poll_ms: 100,
        }
    }
}

impl BindingConfig {
    pub fn change_period(&self) -> Duration {
        Duration::from_millis(self.change_poll_ms.max(1))
    }

    pub fn input_period(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms.max(1))
    }

    pub fn blur_period(&self) -> Duration {
        Duration::from_millis(self.blur_poll_ms.max(1))
    }

    pub fn liveness_period(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms.max(1))
    }
}

/// Address check policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Delay between a blur and the check it schedules
    pub blur_check_delay_ms: u64,
    /// Check attempt on which a minor correction is applied silently
    pub auto_apply_attempt: u32,
    /// Let submission proceed when the remote check itself failed
    pub resume_submit_on_failure: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            blur_check_delay_ms: 300,
            auto_apply_attempt: 2,
            resume_submit_on_failure: false,
        }
    }
}

impl CheckConfig {
    pub fn blur_check_delay(&self) -> Duration {
        Duration::from_millis(self.blur_check_delay_ms)
    }
}

/// Capability bootstrap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// How long a capability waits for the capabilities it depends on
    pub wait_timeout_secs: u64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 10,
        }
    }
}

impl CapabilityConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default EnvFilter directive (overridden by RUST_LOG)
    pub level: String,
    /// Raise swallowed pipeline failures from debug to warn
    pub verbose_diagnostics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose_diagnostics: false,
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub bus_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { bus_capacity: 256 }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve, load and finalize configuration
    ///
    /// Missing files fall back to defaults; a file that exists but does not
    /// parse is an error.
    pub fn resolve(cli_arg: Option<&str>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                info!("No config file found, using compiled defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `FIELDKIT_API_KEY` / `FIELDKIT_ENDPOINT` overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                self.remote.api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            if !endpoint.trim().is_empty() {
                self.remote.endpoint = endpoint;
            }
        }
    }
}

/// Config file path following the resolution priority
///
/// Returns `None` when neither an explicit path nor a platform config file
/// exists.
pub fn resolve_config_path(cli_arg: Option<&str>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// `<config_dir>/fieldkit/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fieldkit").join("config.toml"))
}
