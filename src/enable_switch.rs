//! Runtime enable switch.
//!
//! A flag file, re-read every loop iteration, turns adaptive refresh on or off
//! without restarting the daemon. Without a readable flag file the configured
//! default applies.

use std::path::PathBuf;
use tracing::info;

/// Parse a boolean flag value, `None` if it is not recognisable.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub struct EnableSwitch {
    default: bool,
    flag_path: Option<PathBuf>,
    /// Last observed value, for change logging.
    last: Option<bool>,
}

impl EnableSwitch {
    pub fn new(default: bool, flag_path: Option<PathBuf>) -> Self {
        Self {
            default,
            flag_path,
            last: None,
        }
    }

    /// Switch fixed at `enabled`.
    #[cfg(test)]
    pub fn fixed(enabled: bool) -> Self {
        Self::new(enabled, None)
    }

    /// Read the current value.
    pub fn is_enabled(&mut self) -> bool {
        let enabled = self
            .flag_path
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| parse_flag(&contents))
            .unwrap_or(self.default);

        if self.last != Some(enabled) {
            info!(
                "Adaptive refresh {}",
                if enabled { "enabled" } else { "disabled" }
            );
            self.last = Some(enabled);
        }
        enabled
    }
}
