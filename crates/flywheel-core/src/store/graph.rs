//! Co-occurrence, note-link edges, and tool-invocation log (§3, §4.4, §4.5).

use std::collections::HashMap;

use rusqlite::params;

use crate::error::EngineResult;

use super::StateStore;

#[derive(Debug, Clone)]
pub struct NoteLinkRow {
    pub note_path: String,
    pub target: String,
    pub weight: f64,
    pub weight_updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ToolInvocationRow {
    pub tool_name: String,
    pub session_id: String,
    pub note_paths: Vec<String>,
    pub timestamp_ms: i64,
    pub duration_ms: i64,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CoOccurrenceSnapshot {
    pub associations: HashMap<String, HashMap<String, i64>>,
    pub document_frequency: HashMap<String, i64>,
    pub total_notes_scanned: i64,
    pub min_count_threshold: i64,
}

impl StateStore {
    /// Replace the entire co-occurrence snapshot in one transaction.
    pub fn write_cooccurrence(&mut self, snapshot: &CoOccurrenceSnapshot, generated_at_ms: i64) -> EngineResult<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM cooccurrence_pairs", [])?;
        tx.execute("DELETE FROM cooccurrence_document_frequency", [])?;

        for (a, neighbors) in &snapshot.associations {
            for (b, count) in neighbors {
                if a >= b {
                    continue;
                }
                tx.execute(
                    "INSERT INTO cooccurrence_pairs (a, b, count) VALUES (?1, ?2, ?3)
                     ON CONFLICT(a, b) DO UPDATE SET count = excluded.count",
                    params![a, b, count],
                )?;
            }
        }
        for (name_lower, count) in &snapshot.document_frequency {
            tx.execute(
                "INSERT INTO cooccurrence_document_frequency (name_lower, count) VALUES (?1, ?2)
                 ON CONFLICT(name_lower) DO UPDATE SET count = excluded.count",
                params![name_lower, count],
            )?;
        }
        tx.execute(
            "INSERT INTO cooccurrence_meta (id, total_notes_scanned, min_count_threshold, generated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                total_notes_scanned = excluded.total_notes_scanned,
                min_count_threshold = excluded.min_count_threshold,
                generated_at = excluded.generated_at",
            params![snapshot.total_notes_scanned, snapshot.min_count_threshold, generated_at_ms],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn read_cooccurrence(&self) -> EngineResult<CoOccurrenceSnapshot> {
        let mut snapshot = CoOccurrenceSnapshot::default();

        if let Some((total, min_count)) = self
            .conn()
            .query_row(
                "SELECT total_notes_scanned, min_count_threshold FROM cooccurrence_meta WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .ok()
        {
            snapshot.total_notes_scanned = total;
            snapshot.min_count_threshold = min_count;
        }

        let mut df_stmt = self.conn().prepare("SELECT name_lower, count FROM cooccurrence_document_frequency")?;
        let df_rows = df_stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in df_rows {
            let (name, count) = row?;
            snapshot.document_frequency.insert(name, count);
        }

        let mut pair_stmt = self.conn().prepare("SELECT a, b, count FROM cooccurrence_pairs")?;
        let pair_rows = pair_stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        for row in pair_rows {
            let (a, b, count) = row?;
            snapshot.associations.entry(a.clone()).or_default().insert(b.clone(), count);
            snapshot.associations.entry(b).or_default().insert(a, count);
        }

        Ok(snapshot)
    }

    pub fn cooccurrence_count(&self, a: &str, b: &str) -> EngineResult<i64> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT count FROM cooccurrence_pairs WHERE a = ?1 AND b = ?2",
                params![lo, hi],
                |row| row.get(0),
            )
            .ok();
        Ok(count.unwrap_or(0))
    }

    pub fn document_frequency(&self, name_lower: &str) -> EngineResult<i64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT count FROM cooccurrence_document_frequency WHERE name_lower = ?1",
                params![name_lower],
                |row| row.get(0),
            )
            .ok();
        Ok(count.unwrap_or(0))
    }

    pub fn upsert_note_link(&self, note_path: &str, target: &str, weight: f64, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO note_links (note_path, target, weight, weight_updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(note_path, target) DO UPDATE SET weight = excluded.weight, weight_updated_at = excluded.weight_updated_at",
            params![note_path, target, weight, now_ms],
        )?;
        Ok(())
    }

    pub fn all_note_links(&self) -> EngineResult<Vec<NoteLinkRow>> {
        let mut stmt = self.conn().prepare("SELECT note_path, target, weight, weight_updated_at FROM note_links")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NoteLinkRow {
                    note_path: row.get(0)?,
                    target: row.get(1)?,
                    weight: row.get(2)?,
                    weight_updated_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn edits_survived(&self, note_path: &str, target: &str) -> EngineResult<i64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT edits_survived FROM note_link_history WHERE note_path = ?1 AND target = ?2",
                params![note_path, target],
                |row| row.get(0),
            )
            .ok();
        Ok(count.unwrap_or(0))
    }

    pub fn record_link_observed(&self, note_path: &str, target: &str) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO note_link_history (note_path, target, edits_survived) VALUES (?1, ?2, 1)
             ON CONFLICT(note_path, target) DO UPDATE SET edits_survived = edits_survived + 1",
            params![note_path, target],
        )?;
        Ok(())
    }

    pub fn record_link_removed(&self, note_path: &str, target: &str) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO note_link_history (note_path, target, edits_survived) VALUES (?1, ?2, 0)
             ON CONFLICT(note_path, target) DO UPDATE SET edits_survived = 0",
            params![note_path, target],
        )?;
        Ok(())
    }

    pub fn record_tool_invocation(&self, invocation: &ToolInvocationRow) -> EngineResult<()> {
        let note_paths_json = serde_json::to_string(&invocation.note_paths).unwrap_or_default();
        self.conn().execute(
            "INSERT INTO tool_invocations (tool_name, session_id, note_paths, timestamp_ms, duration_ms, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                invocation.tool_name,
                invocation.session_id,
                note_paths_json,
                invocation.timestamp_ms,
                invocation.duration_ms,
                invocation.success as i64,
            ],
        )?;
        Ok(())
    }

    /// Count of invocations whose `note_paths` include both `note` and any
    /// path mapped to `target` (used by EdgeWeightEngine's co-session signal).
    pub fn co_session_count(&self, note: &str, target_paths: &[String]) -> EngineResult<i64> {
        let mut stmt = self.conn().prepare("SELECT note_paths FROM tool_invocations")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut count = 0;
        for row in rows {
            let note_paths: Vec<String> = serde_json::from_str(&row?).unwrap_or_default();
            let has_note = note_paths.iter().any(|p| p == note);
            let has_target = note_paths.iter().any(|p| target_paths.iter().any(|t| t == p));
            if has_note && has_target {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn source_access_count(&self, note: &str) -> EngineResult<i64> {
        let mut stmt = self.conn().prepare("SELECT note_paths FROM tool_invocations")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut count = 0;
        for row in rows {
            let note_paths: Vec<String> = serde_json::from_str(&row?).unwrap_or_default();
            if note_paths.iter().any(|p| p == note) {
                count += 1;
            }
        }
        Ok(count)
    }
}
