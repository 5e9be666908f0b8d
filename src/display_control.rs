//! Display Control module for committing refresh rates to the panel.
//!
//! The platform mechanism sits behind [`DisplayBackend`]; [`RateCommitter`]
//! wraps it with a cache of the last committed rate so redundant requests never
//! reach the backend.

use crate::error::DisplayError;
use tokio::process::Command;
use tracing::{debug, info};

/// Two rates closer than this are the same rate.
pub const RATE_TOLERANCE_HZ: f32 = 0.1;

/// Placeholder replaced by the target rate in command templates.
pub const HZ_PLACEHOLDER: &str = "{hz}";

/// Placeholder replaced by the configured display id in command templates.
pub const DISPLAY_PLACEHOLDER: &str = "{display}";

/// Platform capability that applies a refresh rate to the active display.
///
/// Implementations decide which display is targeted; callers only ever talk
/// about rates.
pub trait DisplayBackend {
    /// Apply `hz` to the display. Completes only once the request has been
    /// accepted or rejected.
    async fn set_refresh_rate(&self, hz: f32) -> Result<(), DisplayError>;
}

/// Backend that runs an external command per commit.
///
/// The argv template may reference `{hz}` and `{display}`, e.g.
/// `settings put system peak_refresh_rate {hz}`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    template: Vec<String>,
    display_id: u32,
}

impl CommandBackend {
    pub fn new(template: Vec<String>, display_id: u32) -> Self {
        Self {
            template,
            display_id,
        }
    }

    /// Fixed display this backend targets.
    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    /// Expand the argv template for a target rate.
    pub fn render_args(&self, hz: f32) -> Vec<String> {
        let hz = format_hz(hz);
        let display = self.display_id.to_string();
        self.template
            .iter()
            .map(|arg| {
                arg.replace(HZ_PLACEHOLDER, &hz)
                    .replace(DISPLAY_PLACEHOLDER, &display)
            })
            .collect()
    }
}

impl DisplayBackend for CommandBackend {
    async fn set_refresh_rate(&self, hz: f32) -> Result<(), DisplayError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(DisplayError::InvalidRate(hz));
        }

        let args = self.render_args(hz);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| DisplayError::CommandNotFound(String::new()))?;

        let output = Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DisplayError::CommandNotFound(program.clone())
                } else {
                    DisplayError::ExecutionFailed(e)
                }
            })?;

        if !output.status.success() {
            return Err(DisplayError::CommandFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Render a rate without a trailing `.0` for whole numbers.
fn format_hz(hz: f32) -> String {
    if hz.fract() == 0.0 {
        format!("{}", hz as i64)
    } else {
        format!("{:.1}", hz)
    }
}

/// Idempotent front for a [`DisplayBackend`].
pub struct RateCommitter<B> {
    backend: B,
    /// Last rate the backend accepted, `None` until the first success.
    cached_hz: Option<f32>,
}

impl<B: DisplayBackend> RateCommitter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cached_hz: None,
        }
    }

    /// Commit `target_hz` to the display.
    ///
    /// Returns `Ok(true)` if the backend was called, `Ok(false)` if the cached
    /// rate already matched and `force` was not set. On error the cache is left
    /// untouched.
    pub async fn commit(&mut self, target_hz: f32, force: bool) -> Result<bool, DisplayError> {
        if !force && self.is_cached(target_hz) {
            debug!("Rate {:.1}Hz already committed, skipping backend", target_hz);
            return Ok(false);
        }

        self.backend.set_refresh_rate(target_hz).await?;
        self.cached_hz = Some(target_hz);
        info!("Committed refresh rate {:.1}Hz (forced: {})", target_hz, force);
        Ok(true)
    }

    fn is_cached(&self, hz: f32) -> bool {
        self.cached_hz
            .map(|cached| (cached - hz).abs() < RATE_TOLERANCE_HZ)
            .unwrap_or(false)
    }

    /// Last successfully committed rate.
    pub fn cached_hz(&self) -> Option<f32> {
        self.cached_hz
    }
}
