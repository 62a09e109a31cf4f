//! SuggestionRecorder and FeedbackAPIs: tracks which suggestions were
//! actually applied to a note, records explicit and implicit feedback, and
//! exposes read-only observability queries over persisted suggestion and
//! feedback history (§4.6, §4.10). `Scorer::score` already persists the
//! per-candidate breakdown for every ranked entity, passed or not; this
//! module covers the lifecycle after ranking.

use std::collections::HashMap;

use crate::error::EngineResult;
use crate::store::{GraphSnapshotRow, StateStore, SuggestionEventRow};

pub struct SuggestionRecorder;

impl SuggestionRecorder {
    /// Records that `target` was auto-linked or alias-resolved into
    /// `note_path`, so a later removal can be detected as implicit negative
    /// feedback.
    pub fn record_application(store: &StateStore, note_path: &str, target: &str, now_ms: i64) -> EngineResult<()> {
        store.record_application(note_path, target, now_ms)
    }
}

pub struct FeedbackApis;

impl FeedbackApis {
    pub fn record_explicit(store: &StateStore, entity_name: &str, note_path: Option<&str>, context_tag: &str, positive: bool, weight: f64, now_ms: i64) -> EngineResult<()> {
        store.record_feedback(entity_name, note_path, context_tag, positive, weight, now_ms)
    }

    /// Diffs `current_wikilink_targets` (extracted from the note's latest
    /// content) against previously recorded applications for `note_path`.
    /// Every application no longer present is treated as implicit negative
    /// feedback with weight 0.5 — half the default explicit weight, since
    /// a removal is a weaker signal than an explicit thumbs-down.
    pub fn record_implicit_from_removals(store: &StateStore, note_path: &str, current_wikilink_targets: &[String], context_tag: &str, now_ms: i64) -> EngineResult<Vec<String>> {
        let removed = store.detect_removed_applications(note_path, current_wikilink_targets)?;
        let mut removed_names = Vec::with_capacity(removed.len());
        for application in removed {
            store.record_feedback(&application.target, Some(note_path), context_tag, false, 0.5, now_ms)?;
            removed_names.push(application.target);
        }
        Ok(removed_names)
    }

    pub fn accuracy(store: &StateStore, entity_name_lower: &str) -> EngineResult<Option<f64>> {
        store.feedback_accuracy(entity_name_lower)
    }

    pub fn is_suppressed(store: &StateStore, entity_name: &str, context_tag: &str) -> EngineResult<bool> {
        store.is_suppressed(entity_name, context_tag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub avg_degree_delta: f64,
    pub max_degree_delta: i64,
    pub cluster_count_delta: i64,
    pub largest_cluster_size_delta: i64,
    pub hubs_gained: Vec<String>,
    pub hubs_lost: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardExtended {
    pub total_entities_seen: usize,
    pub suggestion_pass_rate: f64,
    pub layer_contribution: HashMap<i64, HashMap<String, f64>>,
    pub latest_snapshot: Option<GraphSnapshotRow>,
}

/// Read-only observability queries, pure functions of persisted state.
pub struct Observability;

impl Observability {
    pub fn entity_journey(store: &StateStore, entity_name: &str) -> EngineResult<Vec<SuggestionEventRow>> {
        store.entity_journey(&entity_name.to_lowercase())
    }

    pub fn score_timeline(store: &StateStore, entity_name: &str, since_ms: i64, until_ms: i64) -> EngineResult<Vec<SuggestionEventRow>> {
        store.score_timeline(&entity_name.to_lowercase(), since_ms, until_ms)
    }

    pub fn layer_contribution_timeseries(store: &StateStore) -> EngineResult<HashMap<i64, HashMap<String, f64>>> {
        store.layer_contribution_timeseries()
    }

    pub fn snapshot_diff(store: &StateStore, t1_ms: i64, t2_ms: i64) -> EngineResult<Option<SnapshotDiff>> {
        let (Some(a), Some(b)) = (store.snapshot_near(t1_ms)?, store.snapshot_near(t2_ms)?) else {
            return Ok(None);
        };

        let hubs_a: std::collections::HashSet<_> = a.top_hubs.into_iter().collect();
        let hubs_b: std::collections::HashSet<_> = b.top_hubs.into_iter().collect();

        Ok(Some(SnapshotDiff {
            avg_degree_delta: b.avg_degree - a.avg_degree,
            max_degree_delta: b.max_degree - a.max_degree,
            cluster_count_delta: b.cluster_count - a.cluster_count,
            largest_cluster_size_delta: b.largest_cluster_size - a.largest_cluster_size,
            hubs_gained: hubs_b.difference(&hubs_a).cloned().collect(),
            hubs_lost: hubs_a.difference(&hubs_b).cloned().collect(),
        }))
    }

    pub fn dashboard_extended(store: &StateStore, total_entities_seen: usize, now_ms: i64) -> EngineResult<DashboardExtended> {
        let layer_contribution = store.layer_contribution_timeseries()?;
        let latest_snapshot = store.snapshot_near(now_ms)?;
        let suggestion_pass_rate = store.suggestion_pass_rate()?;

        Ok(DashboardExtended {
            total_entities_seen,
            suggestion_pass_rate,
            layer_contribution,
            latest_snapshot,
        })
    }
}

pub use crate::scorer::context_tag as classify_context;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Category, Entity};

    #[test]
    fn recorded_application_appears_as_open_until_removed() {
        let store = StateStore::open_in_memory().unwrap();
        SuggestionRecorder::record_application(&store, "projects/foo.md", "MCP", 1_000).unwrap();

        let open = store.applications_for_note("projects/foo.md").unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].target, "MCP");
    }

    #[test]
    fn implicit_feedback_from_removal_suppresses_after_repeats() {
        let store = StateStore::open_in_memory().unwrap();
        store.record_application("projects/foo.md", "MCP", 1_000).unwrap();

        for i in 0..3 {
            FeedbackApis::record_implicit_from_removals(&store, "projects/foo.md", &[], "project", 1_000 + i).unwrap();
            // Re-apply so the next removal pass has something to remove again.
            store.record_application("projects/foo.md", "MCP", 1_000 + i).unwrap();
        }

        assert!(FeedbackApis::is_suppressed(&store, "MCP", "project").unwrap());
    }

    #[test]
    fn snapshot_diff_reports_hub_changes() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .record_graph_snapshot(&GraphSnapshotRow {
                taken_at_ms: 1_000,
                avg_degree: 2.0,
                max_degree: 5,
                cluster_count: 2,
                largest_cluster_size: 4,
                top_hubs: vec!["MCP".to_string()],
            })
            .unwrap();
        store
            .record_graph_snapshot(&GraphSnapshotRow {
                taken_at_ms: 2_000,
                avg_degree: 3.0,
                max_degree: 6,
                cluster_count: 2,
                largest_cluster_size: 5,
                top_hubs: vec!["API".to_string()],
            })
            .unwrap();

        let diff = Observability::snapshot_diff(&store, 1_000, 2_000).unwrap().unwrap();
        assert!((diff.avg_degree_delta - 1.0).abs() < 1e-9);
        assert_eq!(diff.hubs_gained, vec!["API".to_string()]);
        assert_eq!(diff.hubs_lost, vec!["MCP".to_string()]);
    }

    #[test]
    fn dashboard_reports_zero_pass_rate_with_no_suggestions() {
        let store = StateStore::open_in_memory().unwrap();
        let entity = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        store.upsert_entity(&entity).unwrap();
        let dashboard = Observability::dashboard_extended(&store, 1, 1_000).unwrap();
        assert_eq!(dashboard.total_entities_seen, 1);
        assert_eq!(dashboard.suggestion_pass_rate, 0.0);
    }
}
