//! Co-occurrence scanning and NPMI (§4.4).

use std::collections::HashMap;
use std::path::Path;

use crate::entity_index::EntityIndexData;
use crate::store::CoOccurrenceSnapshot;
use crate::store::StateStore;
use crate::error::EngineResult;

use wiki_links::extract_linked_notes;

pub struct CoOccurrenceBuilder<'a> {
    excluded_folders: &'a [String],
}

impl<'a> CoOccurrenceBuilder<'a> {
    pub fn new(excluded_folders: &'a [String]) -> Self {
        Self { excluded_folders }
    }

    /// For each note, extract the set of wikilink targets (alias-resolved to
    /// canonical `name_lower`), emit every unordered pair, and bump document
    /// frequency.
    pub fn scan(&self, vault: &Path, index: &EntityIndexData) -> CoOccurrenceSnapshot {
        let mut snapshot = CoOccurrenceSnapshot::default();
        let mut total_notes = 0_i64;

        for path in walk_markdown(vault, self.excluded_folders) {
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            total_notes += 1;

            let mut resolved = std::collections::BTreeSet::new();
            for name in extract_linked_notes(&content) {
                let lower = name.to_lowercase();
                if let Some(entity) = index.by_name_lower(&lower) {
                    resolved.insert(entity.name_lower.clone());
                } else if let Some((entity, _)) = index.by_alias(&lower) {
                    resolved.insert(entity.name_lower.clone());
                }
            }

            for name in &resolved {
                *snapshot.document_frequency.entry(name.clone()).or_insert(0) += 1;
            }

            let targets: Vec<&String> = resolved.iter().collect();
            for i in 0..targets.len() {
                for j in (i + 1)..targets.len() {
                    let a = targets[i];
                    let b = targets[j];
                    *snapshot.associations.entry(a.clone()).or_default().entry(b.clone()).or_insert(0) += 1;
                    *snapshot.associations.entry(b.clone()).or_default().entry(a.clone()).or_insert(0) += 1;
                }
            }
        }

        snapshot.total_notes_scanned = total_notes;
        snapshot.min_count_threshold = 1;
        snapshot
    }

    pub fn build_and_persist(&self, vault: &Path, index: &EntityIndexData, store: &mut StateStore, now_ms: i64) -> EngineResult<()> {
        let snapshot = self.scan(vault, index);
        store.write_cooccurrence(&snapshot, now_ms)
    }
}

fn walk_markdown(vault: &Path, excluded_folders: &[String]) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    walk_dir(vault, excluded_folders, &mut out);
    out
}

fn walk_dir(dir: &Path, excluded_folders: &[String], out: &mut Vec<std::path::PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == "node_modules" || name == ".git" || excluded_folders.iter().any(|f| f == name) {
                continue;
            }
            walk_dir(&path, excluded_folders, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(path);
        }
    }
}

/// `npmi(cooc_count, df_x, df_y, total_notes)` per §4.4. `0` when any input
/// is `0`, clamped to `[0, 1]` (negative association discarded).
pub fn npmi(cooc_count: i64, df_x: i64, df_y: i64, total_notes: i64) -> f64 {
    if cooc_count <= 0 || df_x <= 0 || df_y <= 0 || total_notes <= 0 {
        return 0.0;
    }

    let total = total_notes as f64;
    let p_xy = cooc_count as f64 / total;
    let p_x = df_x as f64 / total;
    let p_y = df_y as f64 / total;

    if p_xy <= 0.0 {
        return 0.0;
    }
    // p_xy = 1 means the pair always co-occurs: maximal association by
    // convention, since -log2(p_xy) would otherwise divide by zero.
    if p_xy >= 1.0 {
        return 1.0;
    }
    let neg_log_p_xy = -p_xy.log2();

    let pmi = (p_xy / (p_x * p_y)).log2();
    let value = (pmi / neg_log_p_xy).max(0.0);
    value.clamp(0.0, 1.0)
}
