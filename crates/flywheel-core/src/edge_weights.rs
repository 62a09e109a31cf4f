//! Recomputes per-edge weights from edits-survived, co-session, and
//! source-access signals (§4.5).

use crate::entity_index::EntityIndexData;
use crate::error::EngineResult;
use crate::store::StateStore;

pub struct EdgeWeightResult {
    pub edges_updated: usize,
    pub duration_ms: u128,
}

pub struct EdgeWeightEngine;

impl EdgeWeightEngine {
    /// `weight = 1 + min(edits_survived * 0.5, 3) + min(co_session_count * 0.5, 3) + min(source_access_count * 0.2, 2)`,
    /// capped at 10.
    pub fn recompute(store: &mut StateStore, index: &EntityIndexData, now_ms: i64) -> EngineResult<EdgeWeightResult> {
        let start = now_ms;
        let edges = store.all_note_links()?;
        let mut edges_updated = 0;

        for edge in &edges {
            let edits_survived = store.edits_survived(&edge.note_path, &edge.target)?;

            let target_paths: Vec<String> = index
                .by_name_lower(&edge.target)
                .map(|e| vec![e.path.clone()])
                .unwrap_or_default();
            let co_session = store.co_session_count(&edge.note_path, &target_paths)?;
            let source_access = store.source_access_count(&edge.note_path)?;

            let weight = weight_formula(edits_survived, co_session, source_access);
            store.upsert_note_link(&edge.note_path, &edge.target, weight, now_ms)?;
            edges_updated += 1;
        }

        Ok(EdgeWeightResult {
            edges_updated,
            duration_ms: now_ms.saturating_sub(start) as u128,
        })
    }
}

fn weight_formula(edits_survived: i64, co_session_count: i64, source_access_count: i64) -> f64 {
    let base = 1.0;
    let edits_term = (edits_survived as f64 * 0.5).min(3.0);
    let session_term = (co_session_count as f64 * 0.5).min(3.0);
    let access_term = (source_access_count as f64 * 0.2).min(2.0);
    (base + edits_term + session_term + access_term).min(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_formula_caps_each_term_and_total() {
        assert_eq!(weight_formula(0, 0, 0), 1.0);
        assert_eq!(weight_formula(100, 100, 100), 9.0); // 1 + 3 + 3 + 2
        assert!(weight_formula(100, 100, 100) <= 10.0);
    }

    #[test]
    fn weight_never_below_one() {
        assert!(weight_formula(0, 0, 0) >= 1.0);
    }
}
