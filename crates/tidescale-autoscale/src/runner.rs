//! Periodic driver for an [`Engine`].
//!
//! Each epoch dispatches two independent tasks: the decision tick and the
//! ledger report. Both go through one `tokio::sync::Mutex`, whose FIFO
//! fairness keeps ticks causally ordered even when one outlives its epoch.
//! The settle delay after a scale-out is a separate timer task, so the
//! schedule never stalls behind it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tidescale_core::{EngineStatus, LedgerKeys, ResourceLedger};

use crate::engine::{Engine, TickReport};

/// The engine behind its single mutual-exclusion boundary.
pub type SharedEngine = Arc<Mutex<Box<dyn Engine>>>;

pub struct Runner {
    engine: SharedEngine,
    ledger: Arc<dyn ResourceLedger>,
    keys: LedgerKeys,
    epoch: Duration,
    settle_delay: Duration,
    status_tx: watch::Sender<EngineStatus>,
}

impl Runner {
    pub fn new(engine: Box<dyn Engine>, ledger: Arc<dyn ResourceLedger>) -> Self {
        let config = engine.config();
        let keys = config.ledger_keys.clone();
        let epoch = config.epoch;
        let settle_delay = config.settle_delay;
        let (status_tx, _) = watch::channel(engine.status());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            ledger,
            keys,
            epoch,
            settle_delay,
            status_tx,
        }
    }

    /// Status snapshots, updated after every tick and every settle.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Tick every epoch until `shutdown` changes. In-flight tasks are left
    /// to finish on their own.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.epoch);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; decisions start one epoch in.
        interval.tick().await;

        let variant = self.engine.lock().await.variant();
        info!(%variant, epoch_ms = self.epoch.as_millis() as u64, "autoscaler started");

        loop {
            tokio::select! {
                _ = interval.tick() => self.dispatch(),
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn this epoch's decision and report tasks.
    pub fn dispatch(&self) {
        tokio::spawn(decide(
            self.engine.clone(),
            self.status_tx.clone(),
            self.settle_delay,
        ));
        tokio::spawn(report_resources(
            self.engine.clone(),
            self.ledger.clone(),
            self.keys.clone(),
        ));
    }

    /// Run one decision tick and one report inline.
    pub async fn tick_once(&self) -> TickReport {
        let report = decide(self.engine.clone(), self.status_tx.clone(), self.settle_delay).await;
        report_resources(self.engine.clone(), self.ledger.clone(), self.keys.clone()).await;
        report
    }
}

async fn decide(
    engine: SharedEngine,
    status_tx: watch::Sender<EngineStatus>,
    settle_delay: Duration,
) -> TickReport {
    let mut guard = engine.lock().await;
    let report = guard.tick().await;
    status_tx.send_replace(guard.status());
    drop(guard);

    if report.scaled_out {
        debug!(delay_ms = settle_delay.as_millis() as u64, "scheduling scale-out settle");
        tokio::spawn(settle(engine, status_tx, settle_delay));
    }
    report
}

/// Deferred half of a scale-out: wait for new nodes to join, then push the
/// ceiling to all of them.
async fn settle(engine: SharedEngine, status_tx: watch::Sender<EngineStatus>, delay: Duration) {
    tokio::time::sleep(delay).await;
    let mut guard = engine.lock().await;
    guard.finish_scale_out().await;
    status_tx.send_replace(guard.status());
}

/// Write the current ledger values. Failures are logged and dropped.
pub async fn report_resources(
    engine: SharedEngine,
    ledger: Arc<dyn ResourceLedger>,
    keys: LedgerKeys,
) {
    let entry = engine.lock().await.ledger();
    let allocation = entry.allocation_report().to_string();
    let resource_time = entry.resource_time_gb().to_string();

    if let Err(e) = ledger.put(&keys.allocation, &allocation).await {
        warn!(key = %keys.allocation, error = %e, "ledger write failed");
    }
    if let Err(e) = ledger.put(&keys.resource_time, &resource_time).await {
        warn!(key = %keys.resource_time, error = %e, "ledger write failed");
    }
    debug!(%allocation, %resource_time, "resources reported");
}
