//! Library half of the tidescale daemon.
//!
//! Assembles the collaborator clients, the autoscale engine, the ledger and
//! the status endpoint from one configuration file.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/status` | Latest engine status as JSON |
//! | GET | `/metrics` | Prometheus exposition |

pub mod cli;
pub mod logging;
pub mod status;
pub mod wiring;

pub use status::build_status_router;
