//! Domain types shared across tidescale crates.
//!
//! Raw collaborator payloads (`NodeRates`, `ShardCounts`, `StoreSize`), the
//! per-tick demand figures the engine decides on, and the status snapshot
//! published after every tick.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a storage node as reported by a collaborator.
pub type NodeId = String;

/// Megabytes per gigabyte, used when reporting resource time.
pub const MB_PER_GB: f64 = 1024.0;

// ── Collaborator payloads ──────────────────────────────────────────

/// Read/write rates for one node, exactly as the metrics source reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRates {
    pub read: String,
    pub write: String,
}

impl RawRates {
    pub fn new(read: impl Into<String>, write: impl Into<String>) -> Self {
        Self {
            read: read.into(),
            write: write.into(),
        }
    }
}

/// One metrics snapshot: node → raw rates.
pub type NodeRates = BTreeMap<NodeId, RawRates>;

/// One shard-distribution snapshot: node → shard (region) count.
pub type ShardCounts = BTreeMap<NodeId, u64>;

/// Used bytes for one store, from the monitoring backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSize {
    pub instance: String,
    pub bytes: f64,
}

// ── Per-tick demand ────────────────────────────────────────────────

/// Parsed rates for one node in one tick (MB/s).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub node_id: NodeId,
    pub read_rate: f64,
    pub write_rate: f64,
}

/// Mean demand across every node that contributed to a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateDemand {
    pub avg_read: f64,
    pub avg_write: f64,
    /// Nodes that contributed to the averages.
    pub nodes: usize,
    /// Nodes dropped for exceeding the sanity ceiling.
    pub discarded: usize,
}

impl AggregateDemand {
    /// The scalar every decision is driven by.
    pub fn peak(&self) -> f64 {
        self.avg_read.max(self.avg_write)
    }
}

// ── Engine vocabulary ──────────────────────────────────────────────

/// Horizontal-scaling state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Eligible for scale-out and vertical control.
    Active,
    /// Cooling down after a scale-out; only vertical control and the exit check run.
    Frozen,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Active => f.write_str("ACTIVE"),
            EngineState::Frozen => f.write_str("FROZEN"),
        }
    }
}

/// Which trigger policy a deployment runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Streak over a fixed upper bound, fixed bandwidth ceiling.
    #[default]
    Basic,
    /// Absolute smoothed ceiling plus vertical bandwidth control.
    Adaptive,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Basic => "basic",
            Variant::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Variant::Basic),
            "adaptive" => Ok(Variant::Adaptive),
            other => Err(format!("unknown variant {other:?} (expected basic or adaptive)")),
        }
    }
}

/// Multipliers defining the vertical hysteresis band.
///
/// The band tolerates demand in `[ceiling / down_check_factor,
/// ceiling / up_check_factor]`; outside it the ceiling is moved to
/// `demand * up_factor` or `demand * down_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandFactors {
    pub up_factor: f64,
    pub up_check_factor: f64,
    pub down_check_factor: f64,
    pub down_factor: f64,
}

/// Where scale-out and bandwidth commands are aimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub namespace: String,
    pub cluster_name: String,
    /// Label selecting the storage nodes for bulk limit changes.
    pub selector_key: String,
    pub selector_value: String,
}

/// A per-node read/write limit in the coordinator's string form (whole MB/s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthLimit {
    pub read: String,
    pub write: String,
}

impl BandwidthLimit {
    /// Symmetric limit from a ceiling in MB/s, truncated to whole MB/s.
    pub fn from_mbps(ceiling: f64) -> Self {
        let whole = if ceiling.is_finite() && ceiling > 0.0 {
            ceiling.trunc() as u64
        } else {
            0
        };
        Self {
            read: whole.to_string(),
            write: whole.to_string(),
        }
    }
}

// ── Resource ledger ────────────────────────────────────────────────

/// Running resource-usage figures owned by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Point-in-time allocation, `ceiling * replicas` (MB/s).
    pub allocation_mb: f64,
    /// Integral of allocation over time (MB).
    pub resource_time_mb: f64,
}

impl LedgerEntry {
    /// Allocation as reported to the ledger (whole MB/s, rounded up).
    pub fn allocation_report(&self) -> u64 {
        self.allocation_mb.max(0.0).ceil() as u64
    }

    /// Resource time as reported to the ledger (whole GB, rounded up).
    pub fn resource_time_gb(&self) -> u64 {
        (self.resource_time_mb.max(0.0) / MB_PER_GB).ceil() as u64
    }
}

/// The two well-known ledger keys for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerKeys {
    pub allocation: String,
    pub resource_time: String,
}

impl LedgerKeys {
    pub fn for_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            allocation: format!("{prefix}/resourceAllocation"),
            resource_time: format!("{prefix}/resourceTime"),
        }
    }

    /// Default prefix for a variant: `/storage/show/{variant}`.
    pub fn for_variant(variant: Variant) -> Self {
        Self::for_prefix(&format!("/storage/show/{variant}"))
    }
}

/// Snapshot of engine state, published after every decision tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub variant: Variant,
    pub state: EngineState,
    pub replicas: u32,
    pub ceiling_mbps: f64,
    /// Mean of the scale-up window; `None` before the first sample.
    pub smoothed_up: Option<f64>,
    /// Mean of the scale-down window; `None` before the first sample.
    pub smoothed_down: Option<f64>,
    pub active_streak: u32,
    pub frozen_streak: u32,
    pub scale_out_in_flight: bool,
    pub ledger: LedgerEntry,
    pub ticks: u64,
}
