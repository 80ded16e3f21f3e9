//! Fixed-interval driver around the orchestrator
//!
//! Runs a cycle immediately, then one every interval, measured from the start
//! of the previous cycle. Cycles never overlap; a cycle that outlasts the
//! interval is followed directly by the next one. A shutdown request ends the
//! running cycle at its next retry wait or candidate.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::error::{NewscastError, Result};
use crate::orchestrator::{CycleReport, Orchestrator};

pub struct Scheduler {
    orchestrator: Orchestrator,
    tick: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            tick: Duration::from_secs(1),
        }
    }

    /// How often the shutdown flag is polled while waiting
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run a single cycle, catching panics
    ///
    /// Returns `Ok(None)` when the cycle panicked.
    pub async fn run_once(&mut self) -> Result<Option<CycleReport>> {
        match AssertUnwindSafe(self.orchestrator.run_cycle())
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => Ok(Some(report)),
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                error!("Cycle panicked: {}", panic_message(panic.as_ref()));
                Ok(None)
            }
        }
    }

    /// Run a single cycle and announce a fatal error before returning it
    pub async fn run_single(&mut self) -> Result<Option<CycleReport>> {
        let result = self.run_once().await;
        if let Err(e) = &result {
            if e.is_fatal() {
                self.announce_stop(e).await;
            }
        }
        result
    }

    /// Loop until `shutdown` is set or a fatal error occurs
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.orchestrator.set_shutdown(shutdown.clone());
        let interval = self.orchestrator.interval();
        info!(
            "Scheduler started, running every {}",
            humantime::format_duration(interval)
        );

        loop {
            let cycle_started = Instant::now();
            let clock_started = self.orchestrator.clock().now();

            if let Err(e) = self.run_once().await {
                if e.is_fatal() {
                    self.announce_stop(&e).await;
                    return Err(e);
                }
                error!("Cycle failed: {}", e);
            }
            self.log_quotas();

            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            info!(
                "Next cycle at {}",
                self.orchestrator
                    .next_run(clock_started)
                    .format("%Y-%m-%d %H:%M:%S UTC")
            );
            let deadline = cycle_started + interval;
            while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                sleep(remaining.min(self.tick)).await;
            }

            if shutdown.load(Ordering::Relaxed) {
                break;
            }
        }

        info!("Shutdown requested, stopping scheduler");
        self.orchestrator
            .notify("newscast stopped: interrupted by operator")
            .await;
        Ok(())
    }

    async fn announce_stop(&self, e: &NewscastError) {
        error!("Stopping after fatal error: {}", e);
        self.orchestrator
            .notify(&format!("newscast stopped: {}", e))
            .await;
    }

    fn log_quotas(&self) {
        let quotas = self.orchestrator.quotas();
        info!(
            "Quota left: {} classifier call(s) this minute, {} today; {} post(s) today",
            quotas.classifier.minute.remaining(),
            quotas.classifier.day.remaining(),
            quotas.publisher.remaining()
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
