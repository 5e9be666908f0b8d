//! Configuration module for daemon settings.
//!
//! Configuration is read once at startup from a JSON file; a missing file
//! means defaults. Nothing is ever written back.

use crate::core_logic::TimingPolicy;
use crate::display_control::{HZ_PLACEHOLDER, RATE_TOLERANCE_HZ};
use crate::enable_switch::parse_flag;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "ADAPTIVE_REFRESH_CONFIG";

/// Environment variable overriding `enabled`.
pub const ENABLED_ENV: &str = "ADAPTIVE_REFRESH_ENABLED";

/// Touch panel node on the original SM8250 target.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/input/event2";

/// Timing and rate settings, in the units written in the file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub idle_timeout_ms: u64,
    pub min_dwell_boosted_ms: u64,
    pub min_dwell_baseline_ms: u64,
    pub poll_timeout_ms: u64,
    pub boosted_hz: f32,
    pub baseline_hz: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: TimingPolicy::DEFAULT_IDLE_TIMEOUT_MS,
            min_dwell_boosted_ms: TimingPolicy::DEFAULT_MIN_DWELL_BOOSTED_MS,
            min_dwell_baseline_ms: TimingPolicy::DEFAULT_MIN_DWELL_BASELINE_MS,
            poll_timeout_ms: TimingPolicy::DEFAULT_POLL_TIMEOUT_MS,
            boosted_hz: TimingPolicy::DEFAULT_BOOSTED_HZ,
            baseline_hz: TimingPolicy::DEFAULT_BASELINE_HZ,
        }
    }
}

impl PolicyConfig {
    pub fn to_policy(&self) -> TimingPolicy {
        TimingPolicy {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            min_dwell_boosted: Duration::from_millis(self.min_dwell_boosted_ms),
            min_dwell_baseline: Duration::from_millis(self.min_dwell_baseline_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            boosted_hz: self.boosted_hz,
            baseline_hz: self.baseline_hz,
        }
    }
}

/// Display backend settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Argv template run per commit; `{hz}` and `{display}` are substituted.
    pub command: Vec<String>,
    /// Display the command targets.
    pub display_id: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: ["settings", "put", "system", "peak_refresh_rate", HZ_PLACEHOLDER]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            display_id: 0,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub device_path: PathBuf,
    pub enabled: bool,
    /// File whose contents switch the feature on or off at runtime.
    pub enable_flag_path: Option<PathBuf>,
    pub policy: PolicyConfig,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            enabled: true,
            enable_flag_path: None,
            policy: PolicyConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values.
    /// Returns Ok(()) if valid, Err with descriptive message if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.policy;

        for (name, hz) in [
            ("baseline_hz", policy.baseline_hz),
            ("boosted_hz", policy.boosted_hz),
        ] {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} ({}) must be a positive rate",
                    name, hz
                )));
            }
        }

        if policy.boosted_hz - policy.baseline_hz < RATE_TOLERANCE_HZ {
            return Err(ConfigError::ValidationError(format!(
                "boosted_hz ({}) must be greater than baseline_hz ({})",
                policy.boosted_hz, policy.baseline_hz
            )));
        }

        if policy.poll_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend command must name a program".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the `ADAPTIVE_REFRESH_ENABLED` override, if set and parseable.
    pub fn apply_env_override(&mut self, value: Option<&str>) {
        if let Some(enabled) = value.and_then(parse_flag) {
            self.enabled = enabled;
        }
    }
}

/// Loads and holds the startup configuration.
pub struct ConfigManager {
    config: Config,
    path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults.
    /// If the file doesn't exist, returns a manager with default config.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
                path: path.display().to_string(),
                source: e,
            })?;

            serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e)))?
        } else {
            Config::default()
        };

        config.apply_env_override(std::env::var(ENABLED_ENV).ok().as_deref());
        config.validate()?;

        Ok(Self {
            config,
            path: path.to_path_buf(),
        })
    }

    /// Get current configuration.
    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Config path: `$ADAPTIVE_REFRESH_CONFIG`, else
    /// `<config dir>/adaptive-refresh/config.json`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("adaptive-refresh")
            .join("config.json")
    }
}
