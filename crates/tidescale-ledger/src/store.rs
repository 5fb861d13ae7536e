//! redb-backed persistence for resource telemetry.
//!
//! Values are JSON-serialized [`LedgerRecord`]s in redb's `&[u8]` value
//! column. A put overwrites the previous value for the key.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tidescale_core::{BoxFuture, CollabResult, CollaboratorError, ResourceLedger};

use crate::error::{LedgerError, LedgerResult};
use crate::tables::LEDGER;

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// One stored ledger value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub value: String,
    /// Unix timestamp (seconds) of the write.
    pub updated_at: u64,
}

/// Thread-safe ledger backed by redb.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "ledger opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory ledger (for testing).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory ledger opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(LEDGER).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or overwrite the value for `key`.
    pub fn put_value(&self, key: &str, value: &str) -> LedgerResult<()> {
        let record = LedgerRecord {
            value: value.to_string(),
            updated_at: epoch_secs(),
        };
        let bytes = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LEDGER).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %value, "ledger value stored");
        Ok(())
    }

    /// Get the latest record for `key`.
    pub fn get(&self, key: &str) -> LedgerResult<Option<LedgerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEDGER).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: LedgerRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List every key whose name starts with `prefix`, in key order.
    pub fn list(&self, prefix: &str) -> LedgerResult<Vec<(String, LedgerRecord)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEDGER).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                continue;
            }
            let record: LedgerRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push((key.value().to_string(), record));
        }
        Ok(results)
    }
}

impl ResourceLedger for LedgerStore {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, CollabResult<()>> {
        // A redb commit syncs to disk; keep it off the runtime's workers.
        let store = self.clone();
        let (key, value) = (key.to_string(), value.to_string());
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.put_value(&key, &value))
                .await
                .map_err(|e| CollaboratorError::Ledger(e.to_string()))?
                .map_err(|e| CollaboratorError::Ledger(e.to_string()))
        })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
