//! Background training scheduler.
//!
//! One long-lived task: every interval it runs a training batch; once per
//! hour it additionally runs queue retention; each tick it offers both
//! caches a sweep if their own gate says it is due. A `SchedulerHandle`
//! triggers out-of-band processing or a clean shutdown. Errors are logged
//! and the loop moves on; nothing here may take the process down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use slipguard_cache::{IssuerPatternCache, MerchantPatternCache};

use crate::processor::TrainingProcessor;

enum Command {
    ProcessNow,
    Shutdown,
}

/// Control handle for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Run a training batch without waiting for the next tick.
    pub async fn process_now(&self) {
        if self.tx.send(Command::ProcessNow).await.is_err() {
            warn!("scheduler is gone, process_now ignored");
        }
    }

    /// Stop the loop after the current iteration.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

pub struct TrainingScheduler {
    processor: Arc<TrainingProcessor>,
    issuer_cache: Arc<IssuerPatternCache>,
    merchant_cache: Arc<MerchantPatternCache>,
    interval: Duration,
    ticks_per_retention: u64,
}

impl TrainingScheduler {
    pub fn new(
        processor: Arc<TrainingProcessor>,
        issuer_cache: Arc<IssuerPatternCache>,
        merchant_cache: Arc<MerchantPatternCache>,
        interval_secs: u64,
    ) -> Self {
        let interval = Duration::from_secs(interval_secs.max(1));
        // Retention runs roughly hourly regardless of the batch cadence.
        let ticks_per_retention = (3_600 / interval.as_secs()).max(1);
        Self {
            processor,
            issuer_cache,
            merchant_cache,
            interval,
            ticks_per_retention,
        }
    }

    /// Spawn the background loop. Returns the control handle and the task.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(rx));
        (SchedulerHandle { tx }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "training scheduler started"
        );
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks += 1;
                    self.run_batch().await;
                    if ticks % self.ticks_per_retention == 0 {
                        self.run_retention().await;
                    }
                    self.sweep_caches();
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::ProcessNow) => {
                        debug!("on-demand training batch requested");
                        self.run_batch().await;
                    }
                    Some(Command::Shutdown) | None => {
                        info!("training scheduler stopping");
                        break;
                    }
                },
            }
        }
    }

    async fn run_batch(&self) {
        match self.processor.process_once().await {
            Ok(report) if report.is_empty_run() => {}
            Ok(report) => {
                info!(
                    fetched = report.fetched,
                    promoted_issuers = report.promoted.len(),
                    merchant_updates = report.merchant_updates,
                    errors = report.errors.len(),
                    "scheduled training batch finished"
                );
            }
            Err(e) => {
                error!(error = %e, "training batch failed, will retry next interval");
            }
        }
    }

    async fn run_retention(&self) {
        match self.processor.run_retention().await {
            Ok(0) => {}
            Ok(n) => info!(purged = n, "queue retention finished"),
            Err(e) => error!(error = %e, "queue retention failed"),
        }
    }

    fn sweep_caches(&self) {
        if self.issuer_cache.should_cleanup() {
            let n = self.issuer_cache.cleanup_expired();
            if n > 0 {
                debug!(evicted = n, "issuer cache sweep");
            }
        }
        if self.merchant_cache.should_cleanup() {
            let n = self.merchant_cache.cleanup_expired();
            if n > 0 {
                debug!(evicted = n, "merchant cache sweep");
            }
        }
    }
}
