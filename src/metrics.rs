//! Transition statistics for the AdaptiveRefresh daemon.
//!
//! Counts mode switches and failed commits, and tracks how long the panel
//! spent at the boosted rate. Summarised once at shutdown.

use crate::core_logic::RefreshMode;
use std::time::{Duration, Instant};

/// Snapshot of the collected statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub upshifts: u64,
    pub downshifts: u64,
    pub failed_commits: u64,
    pub suppressed_upshifts: u64,
    pub time_boosted: Duration,
    pub uptime: Duration,
}

impl StatsSummary {
    /// Share of uptime spent boosted, in percent.
    pub fn boosted_percent(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.time_boosted.as_secs_f64() / self.uptime.as_secs_f64() * 100.0
    }
}

/// Statistics collector, owned by the state machine.
#[derive(Debug)]
pub struct SwitchStats {
    start_time: Instant,
    upshifts: u64,
    downshifts: u64,
    failed_commits: u64,
    suppressed_upshifts: u64,
    /// Closed boosted intervals.
    time_boosted: Duration,
    /// Start of the current boosted interval.
    boosted_since: Option<Instant>,
}

impl SwitchStats {
    pub fn new(start_time: Instant) -> Self {
        Self {
            start_time,
            upshifts: 0,
            downshifts: 0,
            failed_commits: 0,
            suppressed_upshifts: 0,
            time_boosted: Duration::ZERO,
            boosted_since: None,
        }
    }

    /// Record a committed mode change.
    pub fn record_transition(&mut self, to: RefreshMode, now: Instant) {
        match to {
            RefreshMode::Boosted => {
                self.upshifts += 1;
                self.boosted_since = Some(now);
            }
            RefreshMode::Baseline => {
                self.downshifts += 1;
                if let Some(since) = self.boosted_since.take() {
                    self.time_boosted += now.saturating_duration_since(since);
                }
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_commits += 1;
    }

    /// Record an upshift held back by the baseline dwell time.
    pub fn record_suppressed(&mut self) {
        self.suppressed_upshifts += 1;
    }

    pub fn summary(&self, now: Instant) -> StatsSummary {
        let open = self
            .boosted_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();

        StatsSummary {
            upshifts: self.upshifts,
            downshifts: self.downshifts,
            failed_commits: self.failed_commits,
            suppressed_upshifts: self.suppressed_upshifts,
            time_boosted: self.time_boosted + open,
            uptime: now.saturating_duration_since(self.start_time),
        }
    }
}
