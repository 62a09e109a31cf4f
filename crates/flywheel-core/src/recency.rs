//! Vault walker mapping entity mentions to recency (§4.3).

use std::collections::HashMap;
use std::path::Path;

use crate::entity_index::EntityIndexData;
use crate::error::EngineResult;
use crate::store::StateStore;

pub struct RecencyBuilder<'a> {
    excluded_folders: &'a [String],
}

impl<'a> RecencyBuilder<'a> {
    pub fn new(excluded_folders: &'a [String]) -> Self {
        Self { excluded_folders }
    }

    /// Return cached recency if the store's last scan is within `staleness_ms`.
    pub fn build_if_stale(&self, vault: &Path, index: &EntityIndexData, store: &mut StateStore, staleness_ms: i64, now_ms: i64) -> EngineResult<()> {
        if store.recency_fresh(staleness_ms, now_ms)? {
            return Ok(());
        }
        let recency = self.scan(vault, index)?;
        store.write_recency(&recency, now_ms)
    }

    /// Walk `vault`, skipping `node_modules`, `.git`, and configured excluded
    /// folders, mapping `name_lower → max(last_mention, file_mtime)`.
    pub fn scan(&self, vault: &Path, index: &EntityIndexData) -> EngineResult<HashMap<String, i64>> {
        let mut recency: HashMap<String, i64> = HashMap::new();
        let names: Vec<String> = index
            .all()
            .map(|e| e.name_lower.clone())
            .filter(|n| n.len() >= 3)
            .collect();

        for entry in walk_markdown(vault, self.excluded_folders) {
            let Ok(mtime_ms) = mtime_ms(&entry) else { continue };
            let Ok(content) = std::fs::read_to_string(&entry) else { continue };
            let lower = content.to_lowercase();
            for name_lower in &names {
                if contains_whole_word(&lower, name_lower) {
                    let slot = recency.entry(name_lower.clone()).or_insert(0);
                    *slot = (*slot).max(mtime_ms);
                }
            }
        }
        Ok(recency)
    }

    /// Boost mapping for the Scorer's `recency_boost` layer.
    pub fn boost_for(last_mention_ms: Option<i64>, now_ms: i64) -> f64 {
        let Some(last) = last_mention_ms else { return 0.0 };
        let age_hours = (now_ms - last).max(0) as f64 / 3_600_000.0;
        if age_hours <= 1.0 {
            8.0
        } else if age_hours <= 24.0 {
            5.0
        } else if age_hours <= 72.0 {
            3.0
        } else if age_hours <= 168.0 {
            1.0
        } else {
            0.0
        }
    }
}

fn walk_markdown(vault: &Path, excluded_folders: &[String]) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    walk_dir(vault, vault, excluded_folders, &mut out);
    out
}

fn walk_dir(root: &Path, dir: &Path, excluded_folders: &[String], out: &mut Vec<std::path::PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == "node_modules" || name == ".git" || excluded_folders.iter().any(|f| f == name) {
                continue;
            }
            walk_dir(root, &path, excluded_folders, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(path);
        }
    }
}

fn mtime_ms(path: &Path) -> std::io::Result<i64> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let since_epoch = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(since_epoch.as_millis() as i64)
}

fn contains_whole_word(haystack_lower: &str, needle_lower: &str) -> bool {
    let mut search_start = 0;
    while let Some(pos) = haystack_lower[search_start..].find(needle_lower) {
        let start = search_start + pos;
        let end = start + needle_lower.len();
        let before_ok = start == 0 || !haystack_lower.as_bytes()[start - 1].is_ascii_alphanumeric();
        let after_ok = end >= haystack_lower.len() || !haystack_lower.as_bytes()[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        search_start = start + 1;
        if search_start >= haystack_lower.len() {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_mapping_matches_spec_table() {
        let now = 10_000_000_i64;
        assert_eq!(RecencyBuilder::boost_for(Some(now - 1_000), now), 8.0);
        assert_eq!(RecencyBuilder::boost_for(Some(now - 3_600_001 * 1), now), 5.0);
        assert_eq!(RecencyBuilder::boost_for(None, now), 0.0);
    }

    #[test]
    fn whole_word_matching_ignores_substrings() {
        assert!(contains_whole_word("using mcp today", "mcp"));
        assert!(!contains_whole_word("usingmcptoday", "mcp"));
    }

    #[test]
    fn scan_skips_excluded_folders() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("journal")).unwrap();
        std::fs::write(dir.path().join("journal/2026-01-01.md"), "mentions mcp here").unwrap();
        std::fs::write(dir.path().join("note.md"), "mentions mcp here too").unwrap();

        let excluded = vec!["journal".to_string()];
        let builder = RecencyBuilder::new(&excluded);
        let mut index = crate::entity_index::EntityIndex::new();
        let mut store = StateStore::open_in_memory().unwrap();
        let entity = crate::entity::Entity::new("MCP", "", crate::entity::Category::Technology);
        store.upsert_entity(&entity).unwrap();
        index.rebuild(&store).unwrap();

        let recency = builder.scan(dir.path(), &index.snapshot()).unwrap();
        assert_eq!(recency.len(), 1);
    }
}
