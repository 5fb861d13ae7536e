//! tidescale-autoscale — throughput-driven scaling for a sharded store.
//!
//! Every epoch the engine samples per-node read/write rates, smooths the
//! peak demand, and decides:
//!
//! ```text
//! ACTIVE  --demand over the scale-out bound-->  scale out by `step`  --> FROZEN
//! FROZEN  --demand at/below low bound for more than `check_balance_window` ticks
//!           and shards balanced-->  ACTIVE
//!
//! adaptive only, in both states:
//!   up_mean   * up_check   > ceiling  =>  ceiling = min(up_mean * up_factor, scale_bw_limit)
//!   down_mean * down_check < ceiling  =>  ceiling = down_mean * down_factor
//! ```
//!
//! After the decision, `resource_time += replicas * ceiling * epoch` and
//! `allocation = ceiling * replicas`. The [`Runner`] drives ticks and
//! ledger reports on one timer and serializes both through one mutex.
//!
//! [`CapacityPlanner`] is an independent, storage-size-driven loop.

pub mod adaptive;
pub mod balance;
pub mod basic;
pub mod capacity;
pub mod engine;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use adaptive::AdaptiveEngine;
pub use balance::BalanceGate;
pub use basic::BasicEngine;
pub use capacity::{CapacityPlanner, CapacityPolicy};
pub use engine::{Collaborators, Engine, TickReport, Transition, VerticalAction, build_engine};
pub use runner::{Runner, SharedEngine};
