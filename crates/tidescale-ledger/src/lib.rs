//! tidescale-ledger — durable key/value sink for resource-usage telemetry.
//!
//! Backed by [redb](https://docs.rs/redb). Each key holds the latest
//! reported value as a JSON-serialized [`LedgerRecord`]; persistent and
//! in-memory backends are available (the latter for testing).
//!
//! The `LedgerStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements [`tidescale_core::ResourceLedger`].

pub mod error;
pub mod store;
pub mod tables;

pub use error::{LedgerError, LedgerResult};
pub use store::{LedgerRecord, LedgerStore};
