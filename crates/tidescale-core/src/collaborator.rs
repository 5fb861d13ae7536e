//! Contracts for the external systems the engine drives.
//!
//! Each trait is object-safe (boxed futures) so the engine can hold
//! `Arc<dyn Trait>` and tests can inject scripted fakes.

use std::future::Future;
use std::pin::Pin;

use crate::error::CollabResult;
use crate::types::{BandwidthLimit, NodeRates, ShardCounts, StoreSize};

/// Boxed, sendable future returned by collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reports current per-node read/write rates.
pub trait MetricsSource: Send + Sync {
    fn node_rates(&self) -> BoxFuture<'_, CollabResult<NodeRates>>;
}

/// Reports per-node shard counts.
pub trait ShardBalanceSource: Send + Sync {
    fn shard_counts(&self) -> BoxFuture<'_, CollabResult<ShardCounts>>;
}

/// Executes replica scale-out and bulk bandwidth-limit changes.
pub trait ClusterController: Send + Sync {
    /// Grow the cluster by `increment` replicas.
    fn scale_out<'a>(
        &'a self,
        namespace: &'a str,
        cluster_name: &'a str,
        increment: u32,
    ) -> BoxFuture<'a, CollabResult<()>>;

    /// Apply `limit` to every node matching `selector_key=selector_value`.
    fn set_bandwidth_limit<'a>(
        &'a self,
        namespace: &'a str,
        selector_key: &'a str,
        selector_value: &'a str,
        limit: &'a BandwidthLimit,
    ) -> BoxFuture<'a, CollabResult<()>>;
}

/// Durable key/value sink for usage telemetry.
pub trait ResourceLedger: Send + Sync {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, CollabResult<()>>;
}

/// Reports used bytes per store, for capacity planning.
pub trait StoreSizeSource: Send + Sync {
    fn store_sizes(&self) -> BoxFuture<'_, CollabResult<Vec<StoreSize>>>;
}
