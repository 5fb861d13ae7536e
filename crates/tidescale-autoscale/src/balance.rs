//! Shard distribution check guarding the frozen exit.

use std::sync::Arc;

use tracing::{debug, warn};

use tidescale_core::{ShardBalanceSource, ShardCounts};

/// Allowed deviation from the mean shard count, as a fraction of the mean.
const TOLERANCE_RATIO: f64 = 0.1;

#[derive(Clone)]
pub struct BalanceGate {
    source: Arc<dyn ShardBalanceSource>,
}

impl BalanceGate {
    pub fn new(source: Arc<dyn ShardBalanceSource>) -> Self {
        Self { source }
    }

    /// Fetch shard counts and check them. Any failure reads as unbalanced.
    pub async fn is_balanced(&self) -> bool {
        match self.source.shard_counts().await {
            Ok(counts) => within_tolerance(&counts),
            Err(e) => {
                warn!(error = %e, "shard counts unavailable, treating as unbalanced");
                false
            }
        }
    }
}

/// True when every node is within `ceil(mean * 10%)` shards of the mean.
///
/// An empty snapshot is not balanced: there is nothing to prove the
/// rebalance finished.
pub fn within_tolerance(counts: &ShardCounts) -> bool {
    if counts.is_empty() {
        return false;
    }
    let mean = counts.values().map(|&c| c as f64).sum::<f64>() / counts.len() as f64;
    let tolerance = (mean * TOLERANCE_RATIO).ceil();

    for (node, &count) in counts {
        let deviation = (count as f64 - mean).abs();
        if deviation > tolerance {
            debug!(%node, count, mean, tolerance, "shard count out of tolerance");
            return false;
        }
    }
    true
}
