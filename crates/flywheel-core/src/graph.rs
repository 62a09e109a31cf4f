//! Read-only note-graph adjacency built on demand over `note_links` (§9's
//! "Cyclic relations" design note), plus a `hub_score` recompute helper.

use std::collections::{HashMap, HashSet};

use crate::entity_index::EntityIndexData;
use crate::error::EngineResult;
use crate::store::StateStore;

/// Forward links and backlinks between entities, keyed by `name_lower`.
///
/// Built fresh from `note_links` rows each time — no incremental
/// maintenance, since the store is the source of truth (mirrors the
/// teacher's `GraphIndex`, but driven off persisted edges instead of a live
/// vault scan).
#[derive(Debug, Default)]
pub struct GraphView {
    forward: HashMap<String, HashSet<String>>,
    backward: HashMap<String, HashSet<String>>,
}

impl GraphView {
    /// Each `note_links` row is `(note_path, target)`. `note_path` is
    /// resolved back to the entity/entities whose note lives there via
    /// `EntityIndexData::path_to_targets`, so the graph ends up keyed
    /// uniformly by `name_lower` on both sides.
    pub fn build(store: &StateStore, index: &EntityIndexData) -> EngineResult<Self> {
        let mut view = GraphView::default();
        for edge in store.all_note_links()? {
            let Some(sources) = index.path_to_targets(&edge.note_path) else {
                continue;
            };
            for source in sources {
                view.forward.entry(source.clone()).or_default().insert(edge.target.clone());
                view.backward.entry(edge.target.clone()).or_default().insert(source.clone());
            }
        }
        Ok(view)
    }

    /// Entities this entity's note links TO.
    pub fn forward_links(&self, name_lower: &str) -> HashSet<String> {
        self.forward.get(name_lower).cloned().unwrap_or_default()
    }

    /// Entities whose notes link TO this entity.
    pub fn backlinks(&self, name_lower: &str) -> HashSet<String> {
        self.backward.get(name_lower).cloned().unwrap_or_default()
    }

    /// Union of forward links and backlinks.
    pub fn neighborhood(&self, name_lower: &str) -> HashSet<String> {
        let mut set = self.forward_links(name_lower);
        set.extend(self.backlinks(name_lower));
        set
    }
}

pub struct HubScoreResult {
    pub entities_updated: usize,
}

pub struct HubScoreEngine;

impl HubScoreEngine {
    /// `hub_score` is in-degree: the number of distinct notes linking to an
    /// entity, counted straight off `note_links.target`. Entities with no
    /// incoming edges are written back to 0 rather than left stale.
    pub fn recompute(store: &mut StateStore, index: &EntityIndexData) -> EngineResult<HubScoreResult> {
        let edges = store.all_note_links()?;
        let mut in_degree: HashMap<String, HashSet<String>> = HashMap::new();
        for edge in &edges {
            in_degree.entry(edge.target.clone()).or_default().insert(edge.note_path.clone());
        }

        let mut entities_updated = 0;
        for entity in index.all() {
            let score = in_degree.get(&entity.name_lower).map(|sources| sources.len()).unwrap_or(0);
            store.update_hub_score(&entity.name_lower, score as i64)?;
            entities_updated += 1;
        }

        Ok(HubScoreResult { entities_updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Category, Entity};
    use crate::entity_index::EntityIndex;

    fn seeded() -> (StateStore, EntityIndexData) {
        let mut store = StateStore::open_in_memory().unwrap();
        let mcp = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        store.upsert_entity(&mcp).unwrap();
        let api = Entity::new("API", "tech/api.md", Category::Technology);
        store.upsert_entity(&api).unwrap();

        let mut index = EntityIndex::new();
        index.rebuild(&store).unwrap();
        let snapshot = (*index.snapshot()).clone();
        (store, snapshot)
    }

    #[test]
    fn forward_and_backlinks_mirror_each_other() {
        let (mut store, index) = seeded();
        store.upsert_note_link("tech/mcp.md", "api", 1.0, 1_000).unwrap();

        let view = GraphView::build(&store, &index).unwrap();
        assert!(view.forward_links("mcp").contains("api"));
        assert!(view.backlinks("api").contains("mcp"));
        assert!(view.forward_links("api").is_empty());
    }

    #[test]
    fn neighborhood_is_union_of_forward_and_back() {
        let (mut store, index) = seeded();
        store.upsert_note_link("tech/mcp.md", "api", 1.0, 1_000).unwrap();

        let view = GraphView::build(&store, &index).unwrap();
        let neighborhood = view.neighborhood("api");
        assert!(neighborhood.contains("mcp"));
    }

    #[test]
    fn hub_score_recompute_counts_in_degree() {
        let (mut store, index) = seeded();
        store.upsert_note_link("tech/mcp.md", "api", 1.0, 1_000).unwrap();

        let result = HubScoreEngine::recompute(&mut store, &index).unwrap();
        assert_eq!(result.entities_updated, 2);

        let api = store.entity_by_name_lower("api").unwrap().unwrap();
        assert_eq!(api.hub_score, 1);
        let mcp = store.entity_by_name_lower("mcp").unwrap().unwrap();
        assert_eq!(mcp.hub_score, 0);
    }

    #[test]
    fn hub_score_recompute_resets_stale_scores_to_zero() {
        let (mut store, index) = seeded();
        store.update_hub_score("api", 9).unwrap();

        HubScoreEngine::recompute(&mut store, &index).unwrap();

        let api = store.entity_by_name_lower("api").unwrap().unwrap();
        assert_eq!(api.hub_score, 0);
    }
}
