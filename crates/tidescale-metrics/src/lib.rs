//! tidescale-metrics — turns raw per-node rates into the smoothed demand
//! figure the engine decides on.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource ──node_rates()──▶ Sampler ──AggregateDemand──▶ peak()
//!                                                   │
//!                                  Smoothing (up window, down window)
//!                                                   │
//!                                        up_mean() / down_mean()
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod prometheus;
pub mod sampler;
pub mod window;

pub use prometheus::render_prometheus;
pub use sampler::{AggregateError, SampleError, Sampler, aggregate, parse_rate};
pub use window::{HistoryWindow, Smoothing};
