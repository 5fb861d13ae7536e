//! Capacity planner: grows the cluster when stored data nears capacity.
//!
//! Independent of the throughput engine: with `n` stores of `C` GiB each,
//! once used bytes reach `n * C * warn_ratio` the cluster grows by
//! `ceil(n * growth_ratio)` replicas (at least one). It never shrinks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tidescale_core::config::CapacitySection;
use tidescale_core::{ClusterController, ClusterTarget, CollabResult, StoreSize, StoreSizeSource};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Thresholds for capacity growth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityPolicy {
    pub capacity_per_store_gb: f64,
    pub warn_ratio: f64,
    pub growth_ratio: f64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            capacity_per_store_gb: 10.0,
            warn_ratio: 0.8,
            growth_ratio: 0.25,
        }
    }
}

impl From<&CapacitySection> for CapacityPolicy {
    fn from(section: &CapacitySection) -> Self {
        Self {
            capacity_per_store_gb: section.capacity_per_store_gb,
            warn_ratio: section.warn_ratio,
            growth_ratio: section.growth_ratio,
        }
    }
}

impl CapacityPolicy {
    /// Replicas to add for these store sizes, if any.
    pub fn growth(&self, sizes: &[StoreSize]) -> Option<u32> {
        if sizes.is_empty() {
            return None;
        }
        let stores = sizes.len() as f64;
        let used: f64 = sizes.iter().map(|s| s.bytes).sum();
        let warn_at = stores * self.capacity_per_store_gb * BYTES_PER_GIB * self.warn_ratio;
        if used < warn_at {
            return None;
        }
        Some(((stores * self.growth_ratio).ceil() as u32).max(1))
    }
}

pub struct CapacityPlanner {
    sizes: Arc<dyn StoreSizeSource>,
    controller: Arc<dyn ClusterController>,
    target: ClusterTarget,
    policy: CapacityPolicy,
}

impl CapacityPlanner {
    pub fn new(
        sizes: Arc<dyn StoreSizeSource>,
        controller: Arc<dyn ClusterController>,
        target: ClusterTarget,
        policy: CapacityPolicy,
    ) -> Self {
        Self {
            sizes,
            controller,
            target,
            policy,
        }
    }

    /// One capacity check. Returns the replicas added, if any.
    pub async fn check(&self) -> CollabResult<Option<u32>> {
        let sizes = self.sizes.store_sizes().await?;
        if sizes.is_empty() {
            warn!("no store reported its size, skipping capacity check");
            return Ok(None);
        }
        for size in &sizes {
            debug!(instance = %size.instance, gib = size.bytes / BYTES_PER_GIB, "store size");
        }

        let Some(increment) = self.policy.growth(&sizes) else {
            return Ok(None);
        };
        let used_gib = sizes.iter().map(|s| s.bytes).sum::<f64>() / BYTES_PER_GIB;
        info!(stores = sizes.len(), used_gib, increment, "storage near capacity, growing cluster");
        self.controller
            .scale_out(&self.target.namespace, &self.target.cluster_name, increment)
            .await?;
        Ok(Some(increment))
    }

    /// Check every `interval` until `shutdown` changes.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "capacity planner started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.check().await {
                        warn!(error = %e, "capacity check failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("capacity planner shutting down");
                    break;
                }
            }
        }
    }
}
