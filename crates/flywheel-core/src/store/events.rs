//! Suggestion events, feedback, and suppression persistence (§3, §4.6, §4.10).

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use crate::error::EngineResult;

use super::StateStore;

#[derive(Debug, Clone)]
pub struct SuggestionEventRow {
    pub id: i64,
    pub timestamp_ms: i64,
    pub note_path: Option<String>,
    pub entity_name: String,
    pub final_score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub breakdown: HashMap<String, f64>,
    pub strictness: String,
    pub context_tag: String,
}

#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub positive: bool,
    pub weight: f64,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct SuppressionRow {
    pub entity_name: String,
    pub context_tag: String,
    pub negative_count: i64,
}

#[derive(Debug, Clone)]
pub struct WikilinkApplicationRow {
    pub id: i64,
    pub note_path: String,
    pub target: String,
    pub applied_at_ms: i64,
    pub still_present: bool,
}

/// After this many unanswered negative signals for an (entity, context) pair
/// the engine suppresses further suggestions there.
pub const SUPPRESSION_THRESHOLD: i64 = 3;

impl StateStore {
    /// Record one ranked candidate, passed or not (§4.6 step 9). Failures on
    /// this path are logged, never surfaced — it is a best-effort recording
    /// path per §7.
    pub fn record_suggestion_event(&self, event: &SuggestionEventRow) {
        let breakdown_json = serde_json::to_string(&event.breakdown).unwrap_or_default();
        let result = self.conn().execute(
            "INSERT INTO suggestion_events
                (timestamp_ms, note_path, entity_name, final_score, threshold, passed, breakdown, strictness, context_tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.timestamp_ms,
                event.note_path,
                event.entity_name,
                event.final_score,
                event.threshold,
                event.passed as i64,
                breakdown_json,
                event.strictness,
                event.context_tag,
            ],
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, entity = %event.entity_name, "failed to persist suggestion event");
        }
    }

    pub fn entity_journey(&self, entity_name_lower: &str) -> EngineResult<Vec<SuggestionEventRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, timestamp_ms, note_path, entity_name, final_score, threshold, passed, breakdown, strictness, context_tag
             FROM suggestion_events WHERE LOWER(entity_name) = ?1 ORDER BY timestamp_ms ASC",
        )?;
        let rows = stmt
            .query_map(params![entity_name_lower], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn score_timeline(&self, entity_name_lower: &str, since_ms: i64, until_ms: i64) -> EngineResult<Vec<SuggestionEventRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, timestamp_ms, note_path, entity_name, final_score, threshold, passed, breakdown, strictness, context_tag
             FROM suggestion_events
             WHERE LOWER(entity_name) = ?1 AND timestamp_ms BETWEEN ?2 AND ?3
             ORDER BY timestamp_ms ASC",
        )?;
        let rows = stmt
            .query_map(params![entity_name_lower, since_ms, until_ms], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mean contribution of each scoring layer, bucketed by day (epoch-ms / 86_400_000).
    pub fn layer_contribution_timeseries(&self) -> EngineResult<HashMap<i64, HashMap<String, f64>>> {
        let mut stmt = self.conn().prepare("SELECT timestamp_ms, breakdown FROM suggestion_events")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut buckets: HashMap<i64, HashMap<String, (f64, usize)>> = HashMap::new();
        for row in rows {
            let (ts, breakdown_json) = row?;
            let bucket = ts / 86_400_000;
            let breakdown: HashMap<String, f64> = serde_json::from_str(&breakdown_json).unwrap_or_default();
            let entry = buckets.entry(bucket).or_default();
            for (layer, value) in breakdown {
                let slot = entry.entry(layer).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket, layers)| {
                let avg = layers
                    .into_iter()
                    .map(|(layer, (sum, count))| (layer, sum / count.max(1) as f64))
                    .collect();
                (bucket, avg)
            })
            .collect())
    }

    pub fn record_feedback(&self, entity_name: &str, note_path: Option<&str>, context_tag: &str, positive: bool, weight: f64, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO wikilink_feedback (entity_name, note_path, context_tag, positive, weight, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![entity_name, note_path, context_tag, positive as i64, weight, now_ms],
        )?;

        if !positive {
            self.bump_suppression(entity_name, context_tag, now_ms)?;
        }
        Ok(())
    }

    fn bump_suppression(&self, entity_name: &str, context_tag: &str, now_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO wikilink_suppressions (entity_name, context_tag, negative_count, suppressed_at_ms)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(entity_name, context_tag) DO UPDATE SET
                negative_count = negative_count + 1,
                suppressed_at_ms = excluded.suppressed_at_ms",
            params![entity_name, context_tag, now_ms],
        )?;
        Ok(())
    }

    /// Feedback accuracy for `entity_name`, per §4.6's `(positive - α·negative) / (positive + negative + β)`.
    pub fn feedback_accuracy(&self, entity_name_lower: &str) -> EngineResult<Option<f64>> {
        const ALPHA: f64 = 1.0;
        const BETA: f64 = 2.0;

        let (positive, negative): (i64, i64) = self.conn().query_row(
            "SELECT
                SUM(CASE WHEN positive = 1 THEN 1 ELSE 0 END),
                SUM(CASE WHEN positive = 0 THEN 1 ELSE 0 END)
             FROM wikilink_feedback WHERE LOWER(entity_name) = ?1",
            params![entity_name_lower],
            |row| Ok((row.get::<_, Option<i64>>(0)?.unwrap_or(0), row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )?;

        if positive + negative == 0 {
            return Ok(None);
        }
        let accuracy = (positive as f64 - ALPHA * negative as f64) / (positive as f64 + negative as f64 + BETA);
        Ok(Some(accuracy))
    }

    pub fn is_suppressed(&self, entity_name: &str, context_tag: &str) -> EngineResult<bool> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT negative_count FROM wikilink_suppressions WHERE entity_name = ?1 AND context_tag = ?2",
                params![entity_name, context_tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|c| c >= SUPPRESSION_THRESHOLD).unwrap_or(false))
    }

    /// Fraction of all persisted suggestion events that passed the adaptive
    /// threshold; `0.0` when nothing has been recorded yet.
    pub fn suggestion_pass_rate(&self) -> EngineResult<f64> {
        let (total, passed): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), SUM(CASE WHEN passed = 1 THEN 1 ELSE 0 END) FROM suggestion_events",
            [],
            |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )?;
        if total == 0 {
            return Ok(0.0);
        }
        Ok(passed as f64 / total as f64)
    }

    // --- Wikilink applications (implicit feedback via removal detection) ---

    pub fn record_application(&self, note_path: &str, target: &str, applied_at_ms: i64) -> EngineResult<()> {
        self.conn().execute(
            "INSERT INTO wikilink_applications (note_path, target, applied_at_ms, still_present)
             VALUES (?1, ?2, ?3, 1)",
            params![note_path, target, applied_at_ms],
        )?;
        Ok(())
    }

    pub fn applications_for_note(&self, note_path: &str) -> EngineResult<Vec<WikilinkApplicationRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, note_path, target, applied_at_ms, still_present
             FROM wikilink_applications WHERE note_path = ?1 AND still_present = 1",
        )?;
        let rows = stmt
            .query_map(params![note_path], |row| {
                Ok(WikilinkApplicationRow {
                    id: row.get(0)?,
                    note_path: row.get(1)?,
                    target: row.get(2)?,
                    applied_at_ms: row.get(3)?,
                    still_present: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Compares previously applied targets for `note_path` against
    /// `current_targets` (wikilinks still present in the note's latest
    /// content). Any application no longer present is flagged removed and
    /// returned, so the caller can record it as implicit negative feedback.
    pub fn detect_removed_applications(&self, note_path: &str, current_targets: &[String]) -> EngineResult<Vec<WikilinkApplicationRow>> {
        let applied = self.applications_for_note(note_path)?;
        let mut removed = Vec::new();
        for application in applied {
            if !current_targets.iter().any(|t| t.eq_ignore_ascii_case(&application.target)) {
                self.conn().execute(
                    "UPDATE wikilink_applications SET still_present = 0 WHERE id = ?1",
                    params![application.id],
                )?;
                removed.push(application);
            }
        }
        Ok(removed)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<SuggestionEventRow> {
    let breakdown_json: String = row.get(7)?;
    let breakdown: HashMap<String, f64> = serde_json::from_str(&breakdown_json).unwrap_or_default();
    Ok(SuggestionEventRow {
        id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        note_path: row.get(2)?,
        entity_name: row.get(3)?,
        final_score: row.get(4)?,
        threshold: row.get(5)?,
        passed: row.get::<_, i64>(6)? != 0,
        breakdown,
        strictness: row.get(8)?,
        context_tag: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(entity: &str, passed: bool) -> SuggestionEventRow {
        let mut breakdown = HashMap::new();
        breakdown.insert("exact_match".to_string(), 10.0);
        SuggestionEventRow {
            id: 0,
            timestamp_ms: 1_000,
            note_path: Some("projects/foo.md".to_string()),
            entity_name: entity.to_string(),
            final_score: 10.0,
            threshold: 8.0,
            passed,
            breakdown,
            strictness: "balanced".to_string(),
            context_tag: "project".to_string(),
        }
    }

    #[test]
    fn records_both_passed_and_failed_events() {
        let store = StateStore::open_in_memory().unwrap();
        store.record_suggestion_event(&sample_event("MCP", true));
        store.record_suggestion_event(&sample_event("MCP", false));

        let journey = store.entity_journey("mcp").unwrap();
        assert_eq!(journey.len(), 2);
        assert!(journey.iter().any(|e| e.passed));
        assert!(journey.iter().any(|e| !e.passed));
    }

    #[test]
    fn suppresses_after_repeated_negative_feedback() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .record_feedback("MCP", None, "project", false, 1.0, 1_000 + i)
                .unwrap();
        }
        assert!(store.is_suppressed("MCP", "project").unwrap());
        assert!(!store.is_suppressed("MCP", "tech").unwrap());
    }

    #[test]
    fn detects_removed_applications() {
        let store = StateStore::open_in_memory().unwrap();
        store.record_application("projects/foo.md", "MCP", 1_000).unwrap();
        store.record_application("projects/foo.md", "API", 1_000).unwrap();

        let removed = store
            .detect_removed_applications("projects/foo.md", &["API".to_string()])
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].target, "MCP");

        let still_open = store.applications_for_note("projects/foo.md").unwrap();
        assert_eq!(still_open.len(), 1);
        assert_eq!(still_open[0].target, "API");
    }

    #[test]
    fn feedback_accuracy_matches_formula() {
        let store = StateStore::open_in_memory().unwrap();
        store.record_feedback("MCP", None, "project", true, 1.0, 1).unwrap();
        store.record_feedback("MCP", None, "project", true, 1.0, 2).unwrap();
        store.record_feedback("MCP", None, "project", false, 1.0, 3).unwrap();

        let accuracy = store.feedback_accuracy("mcp").unwrap().unwrap();
        // (2 - 1*1) / (2 + 1 + 2) = 1/5
        assert!((accuracy - 0.2).abs() < 1e-9);
    }
}
