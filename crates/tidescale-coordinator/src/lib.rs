//! tidescale-coordinator — HTTP clients for the systems the engine drives.
//!
//! | client | contract |
//! |---|---|
//! | [`CoordinatorClient`] | `MetricsSource`, bulk and per-node bandwidth limits |
//! | [`PlacementClient`] | `ShardBalanceSource` (region count per store) |
//! | [`KubeScaler`] | replica scale-out on the cluster object |
//! | [`ScaleController`] | `ClusterController` = `KubeScaler` + `CoordinatorClient` |
//! | [`PrometheusClient`] | `StoreSizeSource` for capacity planning |
//!
//! All clients speak plain HTTP/1.1 over a fresh connection per request and
//! bound every call with a timeout.

pub mod controller;
pub mod coordinator;
pub mod kube;
pub mod placement;
pub mod prometheus;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::ScaleController;
pub use coordinator::CoordinatorClient;
pub use kube::KubeScaler;
pub use placement::{PlacementClient, parse_store_status};
pub use prometheus::PrometheusClient;
pub use transport::HttpClient;
