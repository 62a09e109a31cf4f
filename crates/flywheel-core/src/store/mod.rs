//! The embedded state store (§3, §6). A single SQLite file at
//! `<vault>/.state.db`, schema-versioned with forward-only migrations, the
//! same open/migrate/lifecycle shape as the teacher's `FileStorage` but
//! backed by `rusqlite` for the relational shapes this engine needs
//! (entities, edges, events) that a flat file store doesn't fit.

mod entities;
mod events;
mod graph;
mod kv;
mod schema;

pub use entities::{AliasLookup, EntityRow};
pub use events::{FeedbackRow, SuggestionEventRow, SuppressionRow, WikilinkApplicationRow};
pub use graph::{CoOccurrenceSnapshot, NoteLinkRow, ToolInvocationRow};
pub use kv::{GraphSnapshotRow, MutationHintRow};

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::{EngineError, EngineResult};

pub struct StateStore {
    conn: Connection,
    vault_path: PathBuf,
}

impl StateStore {
    /// Open (creating if absent) the store at `<vault>/.state.db`, applying
    /// any migrations not yet recorded in `schema_version`.
    pub fn open(vault_path: &Path) -> EngineResult<Self> {
        let db_path = vault_path.join(".state.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| EngineError::store_error(format!("opening state store: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut store = Self {
            conn,
            vault_path: vault_path.to_path_buf(),
        };
        schema::migrate(&mut store.conn)?;
        Ok(store)
    }

    /// Open an in-memory store, used by tests that don't want a file on disk.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::store_error(format!("opening in-memory store: {e}")))?;
        let mut store = Self {
            conn,
            vault_path: PathBuf::new(),
        };
        schema::migrate(&mut store.conn)?;
        Ok(store)
    }

    /// Delete the store file for `vault_path`, including WAL/SHM siblings.
    pub fn delete(vault_path: &Path) -> EngineResult<()> {
        let db_path = vault_path.join(".state.db");
        for suffix in ["", "-wal", "-shm"] {
            let candidate = PathBuf::from(format!("{}{}", db_path.display(), suffix));
            if candidate.exists() {
                std::fs::remove_file(&candidate)?;
            }
        }
        Ok(())
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn schema_version(&self) -> EngineResult<i64> {
        schema::current_version(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_reports_latest_schema_version() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), schema::LATEST_VERSION);
    }
}
