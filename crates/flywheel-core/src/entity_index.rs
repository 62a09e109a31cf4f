//! In-memory view over StateStore entities (§4.2).
//!
//! Copy-on-rebuild: concurrent readers hold an `Arc` to the snapshot they
//! started with until a fresh one is swapped in (§5).

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{Category, Entity};
use crate::error::EngineResult;
use crate::store::StateStore;

#[derive(Debug, Default, Clone)]
pub struct EntityIndexData {
    by_name_lower: HashMap<String, Entity>,
    by_alias: HashMap<String, (String, String)>, // alias_lower -> (name_lower, alias_as_written)
    by_category: HashMap<Category, Vec<String>>,
    path_to_targets: HashMap<String, Vec<String>>,
}

impl EntityIndexData {
    pub fn by_name_lower(&self, name_lower: &str) -> Option<&Entity> {
        self.by_name_lower.get(name_lower)
    }

    /// Returns the owning entity's `name_lower` and the alias string used.
    pub fn by_alias(&self, alias_lower: &str) -> Option<(&Entity, &str)> {
        let (name_lower, alias) = self.by_alias.get(alias_lower)?;
        self.by_name_lower.get(name_lower).map(|e| (e, alias.as_str()))
    }

    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        self.by_name_lower.values()
    }

    pub fn all_by_category(&self) -> &HashMap<Category, Vec<String>> {
        &self.by_category
    }

    pub fn category_counts(&self) -> HashMap<Category, usize> {
        self.by_category.iter().map(|(cat, names)| (*cat, names.len())).collect()
    }

    pub fn path_to_targets(&self, path: &str) -> Option<&[String]> {
        self.path_to_targets.get(path).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.by_name_lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name_lower.is_empty()
    }
}

/// `EntityIndex` holds the current snapshot behind an `Arc`; `rebuild`
/// produces a new snapshot and swaps it in without blocking in-flight reads.
pub struct EntityIndex {
    current: Arc<EntityIndexData>,
    ready: bool,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self {
            current: Arc::new(EntityIndexData::default()),
            ready: false,
        }
    }
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn snapshot(&self) -> Arc<EntityIndexData> {
        Arc::clone(&self.current)
    }

    /// Idempotent: a rebuild against unchanged underlying data still runs
    /// (the store is the source of truth, not a dirty flag) but callers that
    /// already hold a snapshot are unaffected until they call `snapshot()`
    /// again.
    pub fn rebuild(&mut self, store: &StateStore) -> EngineResult<()> {
        let entities = store.all_entities()?;
        let mut data = EntityIndexData::default();

        for entity in entities {
            let name_lower = entity.name_lower.clone();
            for alias in &entity.aliases {
                data.by_alias
                    .insert(alias.to_lowercase(), (name_lower.clone(), alias.clone()));
            }
            data.by_category.entry(entity.category).or_default().push(name_lower.clone());
            if !entity.path.is_empty() {
                let targets = data.path_to_targets.entry(entity.path.clone()).or_default();
                targets.push(name_lower.clone());
                for alias in &entity.aliases {
                    targets.push(alias.to_lowercase());
                }
            }
            data.by_name_lower.insert(name_lower, entity);
        }

        self.current = Arc::new(data);
        self.ready = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> StateStore {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut mcp = Entity::new("Model Context Protocol", "tech/mcp.md", Category::Technology);
        mcp.add_alias("MCP");
        store.upsert_entity(&mcp).unwrap();
        let api = Entity::new("API", "tech/api.md", Category::Technology);
        store.upsert_entity(&api).unwrap();
        store
    }

    #[test]
    fn rebuild_populates_lookups() {
        let store = seeded_store();
        let mut index = EntityIndex::new();
        assert!(!index.is_ready());
        index.rebuild(&store).unwrap();
        assert!(index.is_ready());

        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.by_name_lower("model context protocol").is_some());
        let (entity, alias_used) = snapshot.by_alias("mcp").unwrap();
        assert_eq!(entity.canonical_name, "Model Context Protocol");
        assert_eq!(alias_used, "MCP");
    }

    #[test]
    fn readers_see_pre_rebuild_snapshot_until_swap() {
        let store = seeded_store();
        let mut index = EntityIndex::new();
        index.rebuild(&store).unwrap();
        let old_snapshot = index.snapshot();

        let mut store2 = StateStore::open_in_memory().unwrap();
        let only = Entity::new("Only", "tech/only.md", Category::Technology);
        store2.upsert_entity(&only).unwrap();
        index.rebuild(&store2).unwrap();

        assert_eq!(old_snapshot.len(), 2);
        assert_eq!(index.snapshot().len(), 1);
    }
}
