//! Event loop driver.
//!
//! One readiness wait per iteration, bounded by the poll timeout. Input that
//! arrived is drained and fed to the controller, then the idle check runs
//! whether or not anything arrived. While the enable switch is off, input is
//! drained and dropped and a boosted display is forced back to baseline
//! instead. The loop ends when the `running` flag is cleared.

use crate::core_logic::{HysteresisController, RefreshMode};
use crate::display_control::DisplayBackend;
use crate::enable_switch::EnableSwitch;
use crate::input::TouchDevice;
use crate::metrics::StatsSummary;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct EventLoop<B> {
    device: TouchDevice,
    controller: HysteresisController<B>,
    enable_switch: EnableSwitch,
    poll_timeout: Duration,
    running: Arc<AtomicBool>,
}

impl<B: DisplayBackend> EventLoop<B> {
    pub fn new(
        device: TouchDevice,
        controller: HysteresisController<B>,
        enable_switch: EnableSwitch,
    ) -> Self {
        let poll_timeout = controller.policy().poll_timeout;
        Self {
            device,
            controller,
            enable_switch,
            poll_timeout,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle for requesting shutdown. Storing `false` stops the loop within
    /// one poll timeout.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until the running flag is cleared, then restore the baseline rate.
    ///
    /// Returns the transition statistics collected over the run.
    pub async fn run(mut self) -> StatsSummary {
        self.controller.establish_baseline().await;
        info!(
            "Event loop running (poll timeout {}ms)",
            self.poll_timeout.as_millis()
        );

        while self.running.load(Ordering::SeqCst) {
            self.tick().await;
        }

        info!("Event loop stopping");
        let now = Instant::now();
        self.controller.shutdown(now).await;
        self.controller.stats().summary(now)
    }

    async fn tick(&mut self) {
        let drained = self.device.wait_and_drain(self.poll_timeout).await;
        let now = Instant::now();
        let enabled = self.enable_switch.is_enabled();

        if let Some(e) = &drained.error {
            warn!("Discarded input read: {}", e);
        }

        if !enabled {
            // The forced path owns the downshift while disabled
            if self.controller.mode() == RefreshMode::Boosted {
                self.controller.force_baseline(now).await;
            }
            return;
        }

        if drained.woke {
            let mut touches = 0usize;
            for event in &drained.events {
                if self.controller.handle_input(event, now).await {
                    touches += 1;
                }
            }
            if touches > 0 {
                debug!(
                    "{} touch signals out of {} events",
                    touches,
                    drained.events.len()
                );
            }
        }

        self.controller.idle_check(now).await;
    }
}
