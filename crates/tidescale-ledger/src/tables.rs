//! redb table definitions for the resource ledger.

use redb::TableDefinition;

/// Latest reported value per ledger key (`/storage/show/{variant}/{metric}`).
pub const LEDGER: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger");
