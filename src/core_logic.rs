//! Core Logic module implementing the touch hysteresis state machine.
//!
//! The controller boosts the refresh rate on touch activity and drops back to
//! the baseline rate once input has been idle long enough. Dwell times on both
//! sides keep it from flapping between the two rates.

use crate::display_control::{DisplayBackend, RateCommitter};
use crate::input::InputEvent;
use crate::metrics::SwitchStats;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Refresh rate tier the controller is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Power-efficient rate, used absent recent touch activity
    #[default]
    Baseline,
    /// High rate, applied while the screen is being touched
    Boosted,
}

/// Timing and rate parameters governing every transition decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingPolicy {
    /// Input silence after which the boosted rate is released
    pub idle_timeout: Duration,
    /// Minimum time spent boosted before a downshift
    pub min_dwell_boosted: Duration,
    /// Minimum time spent at baseline before an upshift
    pub min_dwell_baseline: Duration,
    /// Upper bound on a single readiness wait
    pub poll_timeout: Duration,
    pub boosted_hz: f32,
    pub baseline_hz: f32,
}

impl TimingPolicy {
    pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 800;
    pub const DEFAULT_MIN_DWELL_BOOSTED_MS: u64 = 1500;
    pub const DEFAULT_MIN_DWELL_BASELINE_MS: u64 = 800;
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;
    pub const DEFAULT_BOOSTED_HZ: f32 = 120.0;
    pub const DEFAULT_BASELINE_HZ: f32 = 60.0;

    /// Rate designated for a mode.
    pub fn rate_for(&self, mode: RefreshMode) -> f32 {
        match mode {
            RefreshMode::Baseline => self.baseline_hz,
            RefreshMode::Boosted => self.boosted_hz,
        }
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(Self::DEFAULT_IDLE_TIMEOUT_MS),
            min_dwell_boosted: Duration::from_millis(Self::DEFAULT_MIN_DWELL_BOOSTED_MS),
            min_dwell_baseline: Duration::from_millis(Self::DEFAULT_MIN_DWELL_BASELINE_MS),
            poll_timeout: Duration::from_millis(Self::DEFAULT_POLL_TIMEOUT_MS),
            boosted_hz: Self::DEFAULT_BOOSTED_HZ,
            baseline_hz: Self::DEFAULT_BASELINE_HZ,
        }
    }
}

/// Hysteresis controller for touch-driven refresh rate decisions.
///
/// Only a successful commit changes `mode` or `last_switch_at`; a failed
/// commit is retried the next time its trigger condition holds.
pub struct HysteresisController<B> {
    mode: RefreshMode,
    /// Most recent touch signal
    last_input_at: Option<Instant>,
    /// Most recent committed mode change. `None` means long enough ago that
    /// any dwell check passes.
    last_switch_at: Option<Instant>,
    policy: TimingPolicy,
    committer: RateCommitter<B>,
    stats: SwitchStats,
}

impl<B: DisplayBackend> HysteresisController<B> {
    pub fn new(policy: TimingPolicy, committer: RateCommitter<B>) -> Self {
        Self::new_at(policy, committer, Instant::now())
    }

    /// Create a controller whose statistics start at `now`.
    pub fn new_at(policy: TimingPolicy, committer: RateCommitter<B>, now: Instant) -> Self {
        Self {
            mode: RefreshMode::Baseline,
            last_input_at: None,
            last_switch_at: None,
            policy,
            committer,
            stats: SwitchStats::new(now),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    #[cfg(test)]
    pub fn last_input_at(&self) -> Option<Instant> {
        self.last_input_at
    }

    #[cfg(test)]
    pub fn last_switch_at(&self) -> Option<Instant> {
        self.last_switch_at
    }

    pub fn policy(&self) -> &TimingPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    /// Whether more than `dwell` has passed since the last mode change.
    fn dwell_elapsed(&self, now: Instant, dwell: Duration) -> bool {
        match self.last_switch_at {
            Some(last) => now.saturating_duration_since(last) > dwell,
            None => true,
        }
    }

    fn apply_transition(&mut self, to: RefreshMode, now: Instant) {
        self.stats.record_transition(to, now);
        self.mode = to;
        self.last_switch_at = Some(now);
    }

    /// Force the baseline rate before the loop starts.
    ///
    /// Leaves `last_switch_at` unset so the first touch can boost immediately.
    pub async fn establish_baseline(&mut self) {
        let hz = self.policy.baseline_hz;
        match self.committer.commit(hz, true).await {
            Ok(_) => info!("Baseline {:.1}Hz established", hz),
            Err(e) => {
                self.stats.record_failure();
                warn!("Failed to establish baseline {:.1}Hz: {}", hz, e);
            }
        }
        self.mode = RefreshMode::Baseline;
    }

    /// Classify a raw event and record activity if it is a touch signal.
    ///
    /// Returns whether the event counted as touch activity.
    pub async fn handle_input(&mut self, event: &InputEvent, now: Instant) -> bool {
        if !event.is_touch_signal() {
            return false;
        }
        self.record_activity(now).await;
        true
    }

    /// Record a touch signal at `now`, boosting if the baseline dwell allows.
    pub async fn record_activity(&mut self, now: Instant) {
        self.last_input_at = Some(now);

        if self.mode != RefreshMode::Baseline {
            return;
        }
        if !self.dwell_elapsed(now, self.policy.min_dwell_baseline) {
            self.stats.record_suppressed();
            debug!("Upshift suppressed: baseline dwell not satisfied");
            return;
        }

        let hz = self.policy.rate_for(RefreshMode::Boosted);
        match self.committer.commit(hz, false).await {
            Ok(_) => {
                self.apply_transition(RefreshMode::Boosted, now);
                info!("Touch activity, boosted to {:.1}Hz", hz);
            }
            Err(e) => {
                self.stats.record_failure();
                warn!("Failed to boost to {:.1}Hz, will retry on next touch: {}", hz, e);
            }
        }
    }

    /// Drop back to baseline once input has been idle and the boosted dwell
    /// has passed. Runs every tick whether or not input arrived.
    pub async fn idle_check(&mut self, now: Instant) {
        if self.mode != RefreshMode::Boosted {
            return;
        }

        let idle = match self.last_input_at {
            Some(last) => now.saturating_duration_since(last) > self.policy.idle_timeout,
            None => true,
        };
        if !idle || !self.dwell_elapsed(now, self.policy.min_dwell_boosted) {
            return;
        }

        let hz = self.policy.rate_for(RefreshMode::Baseline);
        match self.committer.commit(hz, false).await {
            Ok(_) => {
                self.apply_transition(RefreshMode::Baseline, now);
                info!("Input idle, returned to {:.1}Hz", hz);
            }
            Err(e) => {
                self.stats.record_failure();
                warn!("Failed to return to {:.1}Hz, will retry: {}", hz, e);
            }
        }
    }

    /// Leave the boosted rate immediately, ignoring dwell and idle timers.
    ///
    /// Used when the runtime switch turns the feature off. No-op at baseline.
    pub async fn force_baseline(&mut self, now: Instant) {
        if self.mode != RefreshMode::Boosted {
            return;
        }

        let hz = self.policy.baseline_hz;
        match self.committer.commit(hz, true).await {
            Ok(_) => {
                self.apply_transition(RefreshMode::Baseline, now);
                info!("Adaptive refresh disabled, forced {:.1}Hz", hz);
            }
            Err(e) => {
                self.stats.record_failure();
                warn!("Failed to force {:.1}Hz while disabled: {}", hz, e);
            }
        }
    }

    /// Restore the baseline rate before exit, whatever the current mode.
    pub async fn shutdown(&mut self, now: Instant) {
        let hz = self.policy.baseline_hz;
        match self.committer.commit(hz, true).await {
            Ok(_) => {
                if self.mode == RefreshMode::Boosted {
                    self.apply_transition(RefreshMode::Baseline, now);
                }
                info!("Restored {:.1}Hz for shutdown", hz);
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    "Failed to restore {:.1}Hz on shutdown (last committed {:?}): {}",
                    hz,
                    self.committer.cached_hz(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_control::tests::RecordingBackend;
    use crate::input::{ABS_MT_POSITION_X, BTN_TOUCH, EV_ABS, EV_KEY};
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn controller(
        policy: TimingPolicy,
        t0: Instant,
    ) -> (HysteresisController<RecordingBackend>, RecordingBackend) {
        let backend = RecordingBackend::default();
        let ctl = HysteresisController::new_at(policy, RateCommitter::new(backend.clone()), t0);
        (ctl, backend)
    }

    #[test]
    fn test_default_policy_constants() {
        let policy = TimingPolicy::default();
        assert_eq!(policy.idle_timeout, ms(800));
        assert_eq!(policy.min_dwell_boosted, ms(1500));
        assert_eq!(policy.min_dwell_baseline, ms(800));
        assert_eq!(policy.poll_timeout, ms(50));
        assert_eq!(policy.rate_for(RefreshMode::Boosted), 120.0);
        assert_eq!(policy.rate_for(RefreshMode::Baseline), 60.0);
    }

    #[tokio::test]
    async fn test_new_controller_starts_at_baseline() {
        let (mut ctl, backend) = controller(TimingPolicy::default(), Instant::now());
        ctl.establish_baseline().await;

        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert!(ctl.last_switch_at().is_none());
        assert!(ctl.last_input_at().is_none());
        assert_eq!(backend.calls(), vec![60.0]);
    }

    // Scenario A: first touch boosts immediately, dwell satisfied by
    // initialization.
    #[tokio::test]
    async fn test_first_touch_boosts_immediately() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;

        let touched = ctl
            .handle_input(&InputEvent::new(EV_KEY, BTN_TOUCH, 1), t0)
            .await;

        assert!(touched);
        assert_eq!(ctl.mode(), RefreshMode::Boosted);
        assert_eq!(ctl.last_switch_at(), Some(t0));
        assert_eq!(backend.calls(), vec![60.0, 120.0]);
    }

    // Scenario B: idle alone is not enough while the boosted dwell runs.
    #[tokio::test]
    async fn test_downshift_waits_for_boosted_dwell() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;
        ctl.record_activity(t0).await;
        assert_eq!(ctl.mode(), RefreshMode::Boosted);

        ctl.idle_check(t0 + ms(900)).await;
        assert_eq!(ctl.mode(), RefreshMode::Boosted);

        ctl.idle_check(t0 + ms(1600)).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert_eq!(ctl.last_switch_at(), Some(t0 + ms(1600)));
        assert_eq!(backend.calls(), vec![60.0, 120.0, 60.0]);
    }

    // Scenario C: a touch right after a downshift is held back by the
    // baseline dwell.
    #[tokio::test]
    async fn test_upshift_waits_for_baseline_dwell() {
        let policy = TimingPolicy {
            min_dwell_boosted: ms(0),
            idle_timeout: ms(0),
            ..TimingPolicy::default()
        };
        let start = Instant::now();
        let (mut ctl, backend) = controller(policy, start);
        ctl.establish_baseline().await;

        // Boost, then fall back to baseline at t0
        ctl.record_activity(start).await;
        let t0 = start + ms(10);
        ctl.idle_check(t0).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert_eq!(ctl.last_switch_at(), Some(t0));

        ctl.record_activity(t0 + ms(500)).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert_eq!(ctl.stats().summary(t0).suppressed_upshifts, 1);

        ctl.record_activity(t0 + ms(900)).await;
        assert_eq!(ctl.mode(), RefreshMode::Boosted);
        assert_eq!(backend.calls(), vec![60.0, 120.0, 60.0, 120.0]);
    }

    // Scenario D: a failed commit leaves state alone and the next touch
    // retries.
    #[tokio::test]
    async fn test_failed_boost_is_retried_on_next_touch() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;

        backend.fail_next(1);
        ctl.record_activity(t0).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert!(ctl.last_switch_at().is_none());
        assert_eq!(ctl.last_input_at(), Some(t0));

        ctl.record_activity(t0 + ms(16)).await;
        assert_eq!(ctl.mode(), RefreshMode::Boosted);
        assert_eq!(ctl.last_switch_at(), Some(t0 + ms(16)));
        assert_eq!(backend.calls(), vec![60.0, 120.0, 120.0]);
        assert_eq!(ctl.stats().summary(t0).failed_commits, 1);
    }

    #[tokio::test]
    async fn test_failed_downshift_is_retried_on_next_tick() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;
        ctl.record_activity(t0).await;

        backend.fail_next(1);
        ctl.idle_check(t0 + ms(1600)).await;
        assert_eq!(ctl.mode(), RefreshMode::Boosted);
        assert_eq!(ctl.last_switch_at(), Some(t0));

        ctl.idle_check(t0 + ms(1650)).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert_eq!(backend.calls(), vec![60.0, 120.0, 60.0, 60.0]);
    }

    #[tokio::test]
    async fn test_touch_release_does_not_extend_idle() {
        let policy = TimingPolicy {
            min_dwell_boosted: ms(100),
            ..TimingPolicy::default()
        };
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(policy, t0);
        ctl.establish_baseline().await;

        assert!(ctl.handle_input(&InputEvent::new(EV_KEY, BTN_TOUCH, 1), t0).await);
        assert!(!ctl
            .handle_input(&InputEvent::new(EV_KEY, BTN_TOUCH, 0), t0 + ms(300))
            .await);
        assert_eq!(ctl.last_input_at(), Some(t0));

        // 850ms after the press, only 550ms after the release
        ctl.idle_check(t0 + ms(850)).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);
        assert_eq!(backend.calls(), vec![60.0, 120.0, 60.0]);
    }

    #[tokio::test]
    async fn test_motion_keeps_boost_alive() {
        let t0 = Instant::now();
        let (mut ctl, _backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;

        let motion = InputEvent::new(EV_ABS, ABS_MT_POSITION_X, 300);
        for step in 0..40 {
            let now = t0 + ms(step * 100);
            ctl.handle_input(&motion, now).await;
            ctl.idle_check(now).await;
            assert_eq!(ctl.mode(), RefreshMode::Boosted);
        }
    }

    #[tokio::test]
    async fn test_repeated_touches_while_boosted_do_not_recommit() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;

        for step in 0..10 {
            ctl.record_activity(t0 + ms(step * 10)).await;
        }
        assert_eq!(backend.calls(), vec![60.0, 120.0]);
    }

    #[tokio::test]
    async fn test_shutdown_forces_baseline_from_either_mode() {
        for boost_first in [false, true] {
            let t0 = Instant::now();
            let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
            ctl.establish_baseline().await;
            if boost_first {
                ctl.record_activity(t0).await;
            }
            let before = backend.calls().len();

            ctl.shutdown(t0 + ms(5)).await;

            let calls = backend.calls();
            assert_eq!(calls.len(), before + 1);
            assert_eq!(calls.last(), Some(&60.0));
            assert_eq!(ctl.mode(), RefreshMode::Baseline);
        }
    }

    #[tokio::test]
    async fn test_failed_shutdown_restore_keeps_cached_rate() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;
        ctl.record_activity(t0).await;

        backend.fail_next(1);
        ctl.shutdown(t0 + ms(5)).await;

        assert_eq!(ctl.mode(), RefreshMode::Boosted);
        assert_eq!(ctl.committer.cached_hz(), Some(120.0));
        assert_eq!(ctl.stats().summary(t0 + ms(5)).failed_commits, 1);
    }

    #[tokio::test]
    async fn test_force_baseline_ignores_dwell() {
        let t0 = Instant::now();
        let (mut ctl, backend) = controller(TimingPolicy::default(), t0);
        ctl.establish_baseline().await;
        ctl.record_activity(t0).await;

        ctl.force_baseline(t0 + ms(1)).await;
        assert_eq!(ctl.mode(), RefreshMode::Baseline);

        // Already at baseline: nothing more to do
        ctl.force_baseline(t0 + ms(2)).await;
        assert_eq!(backend.calls(), vec![60.0, 120.0, 60.0]);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Touch(u64),
        Idle(u64),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1u64..400).prop_map(Step::Touch),
            (1u64..2500).prop_map(Step::Idle),
        ]
    }

    // For any trace of touches and idle gaps, consecutive committed
    // transitions are separated by more than the dwell for their direction.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_dwell_invariant_holds(
            steps in prop::collection::vec(step_strategy(), 1..80),
            idle_ms in 0u64..1500,
            dwell_boosted_ms in 0u64..2000,
            dwell_baseline_ms in 0u64..2000,
        ) {
            let policy = TimingPolicy {
                idle_timeout: ms(idle_ms),
                min_dwell_boosted: ms(dwell_boosted_ms),
                min_dwell_baseline: ms(dwell_baseline_ms),
                ..TimingPolicy::default()
            };
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let t0 = Instant::now();
            let (mut ctl, _backend) = controller(policy, t0);

            let transitions: Vec<(Instant, RefreshMode)> = runtime.block_on(async {
                ctl.establish_baseline().await;
                let mut now = t0;
                let mut seen = Vec::new();
                let mut mode = ctl.mode();
                for step in &steps {
                    let (gap, touch) = match step {
                        Step::Touch(gap) => (*gap, true),
                        Step::Idle(gap) => (*gap, false),
                    };
                    now += ms(gap);
                    if touch {
                        ctl.record_activity(now).await;
                    }
                    ctl.idle_check(now).await;
                    if ctl.mode() != mode {
                        mode = ctl.mode();
                        seen.push((now, mode));
                    }
                }
                seen
            });

            for pair in transitions.windows(2) {
                let (prev_at, _) = pair[0];
                let (at, to) = pair[1];
                let dwell = match to {
                    RefreshMode::Boosted => policy.min_dwell_baseline,
                    RefreshMode::Baseline => policy.min_dwell_boosted,
                };
                prop_assert!(at.duration_since(prev_at) > dwell);
            }
        }
    }
}
