//! Polling worker for periodic reconciliation

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::reconcile::{Orchestrator, PassOutcome};

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Initial delay before the first pass
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            initial_delay: Duration::ZERO,
        }
    }
}

/// Run the poller worker: one pass at startup, then one per interval
pub async fn run<S, F>(
    options: &Options,
    orchestrator: &Orchestrator,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Poller worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        debug!("Periodic reconciliation...");

        // an in-flight pass is never interrupted, shutdown waits for it
        match orchestrator.trigger(false).await {
            Ok(PassOutcome::AlreadyRunning) => debug!("Pass already running, poll skipped"),
            Ok(outcome) => debug!("Periodic pass finished: {:?}", outcome),
            Err(e) => error!("Periodic pass failed: {}", e),
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
