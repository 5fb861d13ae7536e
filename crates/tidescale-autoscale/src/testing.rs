//! In-test collaborators: scripted sources and recording sinks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tidescale_core::config::TidescaleConfig;
use tidescale_core::{
    BandwidthLimit, BoxFuture, ClusterController, CollabResult, CollaboratorError, EngineConfig,
    MetricsSource, NodeRates, RawRates, ResourceLedger, ShardBalanceSource, ShardCounts, StoreSize,
    StoreSizeSource, Variant,
};

use crate::engine::Collaborators;

/// Metrics source returning whatever was last set; `None` fails.
#[derive(Default)]
pub struct FakeMetrics {
    rates: Mutex<Option<NodeRates>>,
}

impl FakeMetrics {
    /// `nodes` nodes each reporting the same read/write rate.
    pub fn uniform(nodes: usize, read: f64, write: f64) -> Self {
        let source = Self::default();
        source.set_uniform(nodes, read, write);
        source
    }

    pub fn set_uniform(&self, nodes: usize, read: f64, write: f64) {
        let rates = (0..nodes)
            .map(|i| {
                (
                    format!("tikv-{i}"),
                    RawRates::new(read.to_string(), write.to_string()),
                )
            })
            .collect();
        *self.rates.lock().unwrap() = Some(rates);
    }

    pub fn fail(&self) {
        *self.rates.lock().unwrap() = None;
    }
}

impl MetricsSource for FakeMetrics {
    fn node_rates(&self) -> BoxFuture<'_, CollabResult<NodeRates>> {
        let rates = self.rates.lock().unwrap().clone();
        Box::pin(async move {
            rates.ok_or_else(|| CollaboratorError::Transport("metrics unavailable".into()))
        })
    }
}

/// Shard source with settable counts; `None` fails.
pub struct FakeShards {
    counts: Mutex<Option<ShardCounts>>,
}

impl FakeShards {
    pub fn balanced(stores: usize) -> Self {
        Self::with_counts(&vec![100; stores])
    }

    pub fn with_counts(values: &[u64]) -> Self {
        let counts = values
            .iter()
            .enumerate()
            .map(|(i, &c)| (i.to_string(), c))
            .collect();
        Self {
            counts: Mutex::new(Some(counts)),
        }
    }

    pub fn failing() -> Self {
        Self {
            counts: Mutex::new(None),
        }
    }

    pub fn set_counts(&self, values: &[u64]) {
        *self.counts.lock().unwrap() = Some(
            values
                .iter()
                .enumerate()
                .map(|(i, &c)| (i.to_string(), c))
                .collect(),
        );
    }
}

impl ShardBalanceSource for FakeShards {
    fn shard_counts(&self) -> BoxFuture<'_, CollabResult<ShardCounts>> {
        let counts = self.counts.lock().unwrap().clone();
        Box::pin(async move {
            counts.ok_or_else(|| CollaboratorError::Transport("placement unavailable".into()))
        })
    }
}

/// Controller recording every command it accepts.
#[derive(Default)]
pub struct RecordingController {
    pub scale_outs: Mutex<Vec<(String, String, u32)>>,
    pub limits: Mutex<Vec<BandwidthLimit>>,
    pub fail_scale_out: AtomicBool,
    pub fail_limits: AtomicBool,
}

impl RecordingController {
    pub fn scale_out_calls(&self) -> Vec<u32> {
        self.scale_outs.lock().unwrap().iter().map(|c| c.2).collect()
    }

    pub fn limit_calls(&self) -> Vec<String> {
        self.limits.lock().unwrap().iter().map(|l| l.read.clone()).collect()
    }
}

impl ClusterController for RecordingController {
    fn scale_out<'a>(
        &'a self,
        namespace: &'a str,
        cluster_name: &'a str,
        increment: u32,
    ) -> BoxFuture<'a, CollabResult<()>> {
        Box::pin(async move {
            if self.fail_scale_out.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Rejected("scale-out refused".into()));
            }
            self.scale_outs.lock().unwrap().push((
                namespace.to_string(),
                cluster_name.to_string(),
                increment,
            ));
            Ok(())
        })
    }

    fn set_bandwidth_limit<'a>(
        &'a self,
        _namespace: &'a str,
        _selector_key: &'a str,
        _selector_value: &'a str,
        limit: &'a BandwidthLimit,
    ) -> BoxFuture<'a, CollabResult<()>> {
        Box::pin(async move {
            if self.fail_limits.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Rejected("limit refused".into()));
            }
            self.limits.lock().unwrap().push(limit.clone());
            Ok(())
        })
    }
}

/// Ledger keeping the last value per key, optionally failing every write.
#[derive(Default)]
pub struct MemoryLedger {
    pub values: Mutex<BTreeMap<String, String>>,
    pub writes: Mutex<usize>,
    pub fail: AtomicBool,
}

impl MemoryLedger {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

impl ResourceLedger for MemoryLedger {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, CollabResult<()>> {
        Box::pin(async move {
            *self.writes.lock().unwrap() += 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Ledger("disk full".into()));
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }
}

/// Store-size source with fixed answers; `None` fails.
pub struct FakeSizes {
    sizes: Mutex<Option<Vec<StoreSize>>>,
}

impl FakeSizes {
    pub fn gib(values: &[f64]) -> Self {
        let sizes = values
            .iter()
            .enumerate()
            .map(|(i, &g)| StoreSize {
                instance: format!("tikv-{i}:20180"),
                bytes: g * 1024.0 * 1024.0 * 1024.0,
            })
            .collect();
        Self {
            sizes: Mutex::new(Some(sizes)),
        }
    }

    pub fn failing() -> Self {
        Self {
            sizes: Mutex::new(None),
        }
    }
}

impl StoreSizeSource for FakeSizes {
    fn store_sizes(&self) -> BoxFuture<'_, CollabResult<Vec<StoreSize>>> {
        let sizes = self.sizes.lock().unwrap().clone();
        Box::pin(async move {
            sizes.ok_or_else(|| CollaboratorError::Transport("prometheus unavailable".into()))
        })
    }
}

/// Every fake handle, so tests can script inputs and inspect effects.
pub struct Harness {
    pub metrics: Arc<FakeMetrics>,
    pub shards: Arc<FakeShards>,
    pub controller: Arc<RecordingController>,
    pub ledger: Arc<MemoryLedger>,
}

impl Harness {
    pub fn new(metrics: FakeMetrics) -> Self {
        Self {
            metrics: Arc::new(metrics),
            shards: Arc::new(FakeShards::balanced(4)),
            controller: Arc::new(RecordingController::default()),
            ledger: Arc::new(MemoryLedger::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            metrics: self.metrics.clone(),
            shards: self.shards.clone(),
            controller: self.controller.clone(),
        }
    }
}

/// Frozen config for `variant` with default thresholds, patched by `edit`.
pub fn engine_config(variant: Variant, edit: impl FnOnce(&mut TidescaleConfig)) -> EngineConfig {
    let mut config = TidescaleConfig::default();
    config.engine.variant = variant;
    config.engine.epoch = "10s".into();
    edit(&mut config);
    config.engine_config().unwrap()
}

pub const EPOCH: Duration = Duration::from_secs(10);
