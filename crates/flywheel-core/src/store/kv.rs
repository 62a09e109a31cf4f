//! Recency, memories, mutation hints, typed engine state, and graph snapshots.

use rusqlite::{params, OptionalExtension};

use crate::error::EngineResult;

use super::StateStore;

const MUTATION_HINTS_CAP: i64 = 100;

#[derive(Debug, Clone)]
pub struct MutationHintRow {
    pub timestamp_ms: i64,
    pub path: String,
    pub operation: String,
    pub before_hash: String,
    pub after_hash: String,
}

#[derive(Debug, Clone)]
pub struct GraphSnapshotRow {
    pub taken_at_ms: i64,
    pub avg_degree: f64,
    pub max_degree: i64,
    pub cluster_count: i64,
    pub largest_cluster_size: i64,
    pub top_hubs: Vec<String>,
}

impl StateStore {
    // --- Recency -----------------------------------------------------

    pub fn recency_fresh(&self, staleness_ms: i64, now_ms: i64) -> EngineResult<bool> {
        let scan_finished: Option<i64> = self.conn().query_row(
            "SELECT MAX(scan_finished_at_epoch_ms) FROM entity_recency",
            [],
            |row| row.get(0),
        )?;
        Ok(scan_finished.map(|t| now_ms - t < staleness_ms).unwrap_or(false))
    }

    pub fn write_recency(&mut self, recency: &std::collections::HashMap<String, i64>, scan_finished_at_ms: i64) -> EngineResult<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM entity_recency", [])?;
        for (name_lower, last_mention) in recency {
            tx.execute(
                "INSERT INTO entity_recency (name_lower, last_mention_epoch_ms, scan_finished_at_epoch_ms)
                 VALUES (?1, ?2, ?3)",
                params![name_lower, last_mention, scan_finished_at_ms],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn last_mention(&self, name_lower: &str) -> EngineResult<Option<i64>> {
        let value = self
            .conn()
            .query_row(
                "SELECT last_mention_epoch_ms FROM entity_recency WHERE name_lower = ?1",
                params![name_lower],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // --- Memories ------------------------------------------------------

    pub fn upsert_memory(&self, key: &str, value: &str, memory_type: &str, confidence: f64, ttl_days: Option<i64>, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO memories (key, value, memory_type, confidence, created_at_ms, updated_at_ms, accessed_at_ms, ttl_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                memory_type = excluded.memory_type,
                confidence = excluded.confidence,
                updated_at_ms = excluded.updated_at_ms,
                ttl_days = excluded.ttl_days",
            params![key, value, memory_type, confidence, now_ms, ttl_days],
        )?;
        Ok(())
    }

    pub fn touch_memory(&self, key: &str, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "UPDATE memories SET accessed_at_ms = ?2 WHERE key = ?1",
            params![key, now_ms],
        )?;
        Ok(())
    }

    /// Delete memories whose TTL has elapsed; returns the count removed.
    pub fn sweep_expired_memories(&self, now_ms: i64) -> EngineResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM memories
             WHERE ttl_days IS NOT NULL
               AND (?1 - created_at_ms) > (ttl_days * 86400000)",
            params![now_ms],
        )?;
        Ok(removed)
    }

    // --- Mutation hints --------------------------------------------------

    /// Push a hint; trims the FIFO log back down to `MUTATION_HINTS_CAP`.
    pub fn push_mutation_hint(&self, hint: &MutationHintRow) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO mutation_hints (timestamp_ms, path, operation, before_hash, after_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![hint.timestamp_ms, hint.path, hint.operation, hint.before_hash, hint.after_hash],
        )?;
        self.conn().execute(
            "DELETE FROM mutation_hints WHERE id NOT IN (
                SELECT id FROM mutation_hints ORDER BY id DESC LIMIT ?1
             )",
            params![MUTATION_HINTS_CAP],
        )?;
        Ok(())
    }

    pub fn recent_mutation_hints(&self, limit: i64) -> EngineResult<Vec<MutationHintRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT timestamp_ms, path, operation, before_hash, after_hash
             FROM mutation_hints ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(MutationHintRow {
                    timestamp_ms: row.get(0)?,
                    path: row.get(1)?,
                    operation: row.get(2)?,
                    before_hash: row.get(3)?,
                    after_hash: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Engine state (typed key-value) ---------------------------------

    pub fn set_engine_state(&self, key: &str, value_json: &str, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO engine_state (key, value_blob, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_blob = excluded.value_blob, updated_at_ms = excluded.updated_at_ms",
            params![key, value_json, now_ms],
        )?;
        Ok(())
    }

    pub fn get_engine_state(&self, key: &str) -> EngineResult<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value_blob FROM engine_state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn clear_engine_state(&self, key: &str) -> EngineResult<()> {
        self.conn().execute("DELETE FROM engine_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    // --- Graph snapshots -------------------------------------------------

    pub fn record_graph_snapshot(&self, snapshot: &GraphSnapshotRow) -> EngineResult<()> {
        let top_hubs_json = serde_json::to_string(&snapshot.top_hubs).unwrap_or_default();
        self.conn().execute(
            "INSERT INTO graph_snapshots (taken_at_ms, avg_degree, max_degree, cluster_count, largest_cluster_size, top_hubs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.taken_at_ms,
                snapshot.avg_degree,
                snapshot.max_degree,
                snapshot.cluster_count,
                snapshot.largest_cluster_size,
                top_hubs_json,
            ],
        )?;
        Ok(())
    }

    pub fn snapshot_near(&self, timestamp_ms: i64) -> EngineResult<Option<GraphSnapshotRow>> {
        let row = self
            .conn()
            .query_row(
                "SELECT taken_at_ms, avg_degree, max_degree, cluster_count, largest_cluster_size, top_hubs
                 FROM graph_snapshots ORDER BY ABS(taken_at_ms - ?1) ASC LIMIT 1",
                params![timestamp_ms],
                |row| {
                    let top_hubs_json: String = row.get(5)?;
                    Ok(GraphSnapshotRow {
                        taken_at_ms: row.get(0)?,
                        avg_degree: row.get(1)?,
                        max_degree: row.get(2)?,
                        cluster_count: row.get(3)?,
                        largest_cluster_size: row.get(4)?,
                        top_hubs: serde_json::from_str(&top_hubs_json).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn mutation_hints_fifo_caps_at_100() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..150 {
            store
                .push_mutation_hint(&MutationHintRow {
                    timestamp_ms: i,
                    path: format!("note-{i}.md"),
                    operation: "AddToSection".to_string(),
                    before_hash: "aaaaaaaaaaaa".to_string(),
                    after_hash: "bbbbbbbbbbbb".to_string(),
                })
                .unwrap();
        }
        let hints = store.recent_mutation_hints(1000).unwrap();
        assert_eq!(hints.len(), 100);
        assert_eq!(hints[0].path, "note-149.md");
    }

    #[test]
    fn recency_freshness_respects_staleness_bound() {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut recency = HashMap::new();
        recency.insert("mcp".to_string(), 1_000);
        store.write_recency(&recency, 1_000).unwrap();

        assert!(store.recency_fresh(3_600_000, 1_500).unwrap());
        assert!(!store.recency_fresh(3_600_000, 1_000 + 3_600_001).unwrap());
    }

    #[test]
    fn engine_state_round_trips() {
        let store = StateStore::open_in_memory().unwrap();
        store.set_engine_state("last_commit", "{\"hash\":\"abc\"}", 1_000).unwrap();
        assert_eq!(store.get_engine_state("last_commit").unwrap(), Some("{\"hash\":\"abc\"}".to_string()));
        store.clear_engine_state("last_commit").unwrap();
        assert_eq!(store.get_engine_state("last_commit").unwrap(), None);
    }
}
