//! AdaptiveRefresh Daemon - touch-driven refresh rate switching.
//!
//! This daemon watches the touch panel's input device and raises the display
//! refresh rate while the screen is being touched, returning to a
//! power-efficient baseline once input goes idle.

mod config;
mod core_logic;
mod display_control;
mod enable_switch;
mod error;
mod event_loop;
mod input;
mod logging;
mod metrics;

use config::ConfigManager;
use core_logic::HysteresisController;
use display_control::{CommandBackend, RateCommitter};
use enable_switch::EnableSwitch;
use error::DaemonError;
use event_loop::EventLoop;
use input::TouchDevice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with JSON format to both stderr and rotating file
    let _log_guard = logging::init_logging().map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        e
    })?;

    info!("AdaptiveRefresh daemon starting...");

    let result = run_daemon().await;

    match &result {
        Ok(()) => info!("AdaptiveRefresh daemon shut down gracefully"),
        Err(e) => error!("AdaptiveRefresh daemon error: {}", e),
    }

    result.map_err(Into::into)
}

/// Main daemon entry point. Any error returned here is a fatal startup error.
async fn run_daemon() -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let config_manager = ConfigManager::load_or_default(&config_path)?;
    info!("Configuration loaded from {:?}", config_manager.path());

    let config = config_manager.get();
    let policy = config.policy.to_policy();

    let device = TouchDevice::open(&config.device_path)?;
    info!("Watching touch input on {:?}", config.device_path);

    let backend = CommandBackend::new(config.backend.command.clone(), config.backend.display_id);
    info!(
        "Display backend: {:?} on display {}",
        config.backend.command,
        backend.display_id()
    );

    let controller = HysteresisController::new(policy, RateCommitter::new(backend));
    let enable_switch = EnableSwitch::new(config.enabled, config.enable_flag_path.clone());
    let event_loop = EventLoop::new(device, controller, enable_switch);

    // Register before the loop starts so an early SIGTERM is not lost
    let sigterm = signal(SignalKind::terminate())
        .map_err(|e| DaemonError::Runtime(format!("Failed to register SIGTERM: {}", e)))?;
    let sigint = signal(SignalKind::interrupt())
        .map_err(|e| DaemonError::Runtime(format!("Failed to register SIGINT: {}", e)))?;
    tokio::spawn(wait_for_termination(sigterm, sigint, event_loop.running_flag()));

    info!(
        "AdaptiveRefresh running: {:.1}Hz baseline, {:.1}Hz boosted",
        policy.baseline_hz, policy.boosted_hz
    );

    let summary = event_loop.run().await;
    info!(
        upshifts = summary.upshifts,
        downshifts = summary.downshifts,
        failed_commits = summary.failed_commits,
        suppressed_upshifts = summary.suppressed_upshifts,
        boosted_secs = summary.time_boosted.as_secs(),
        uptime_secs = summary.uptime.as_secs(),
        "Boosted {:.1}% of uptime",
        summary.boosted_percent()
    );

    Ok(())
}

/// Clear the running flag on SIGTERM or SIGINT. Nothing else happens here;
/// the event loop notices the flag on its next iteration.
async fn wait_for_termination(mut sigterm: Signal, mut sigint: Signal, running: Arc<AtomicBool>) {
    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    running.store(false, Ordering::SeqCst);
}
