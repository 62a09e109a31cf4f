//! Rewrites content to resolve alias wikilinks and insert auto-links (§4.7).

use std::collections::HashSet;

use regex::Regex;

use crate::entity_index::EntityIndexData;
use crate::scorer::Candidate;

use wiki_links::{link_spans, parse_wiki_links};

#[derive(Debug, Clone, Default)]
pub struct LinkResult {
    pub content: String,
    pub links_added: usize,
    pub linked_entities: HashSet<String>,
}

pub struct Linker;

impl Linker {
    /// Alias-resolution pass, then auto-link pass, as described in §4.7.
    pub fn link(content: &str, candidates: &[Candidate], index: &EntityIndexData) -> LinkResult {
        let mut links_added = 0;
        let mut linked_entities = HashSet::new();

        let after_alias_pass = resolve_alias_wikilinks(content, index, &mut links_added, &mut linked_entities);
        let after_autolink = autolink_candidates(&after_alias_pass, candidates, index, &mut links_added, &mut linked_entities);

        LinkResult {
            content: after_autolink,
            links_added,
            linked_entities,
        }
    }
}

/// Find every existing `[[X]]` or `[[X|Y]]` where `X` matches an alias
/// (not the canonical name) and rewrite to `[[Canonical|X or Y]]`.
fn resolve_alias_wikilinks(content: &str, index: &EntityIndexData, links_added: &mut usize, touched: &mut HashSet<String>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last_end = 0;

    for (start, end) in link_spans(content) {
        out.push_str(&content[last_end..start]);
        let span = &content[start..end];
        let Some(rewritten) = rewrite_alias_span(span, index) else {
            out.push_str(span);
            last_end = end;
            continue;
        };
        if let Some(entity_name) = rewritten.1 {
            *links_added += 1;
            touched.insert(entity_name);
        }
        out.push_str(&rewritten.0);
        last_end = end;
    }
    out.push_str(&content[last_end..]);
    out
}

fn rewrite_alias_span(span: &str, index: &EntityIndexData) -> Option<(String, Option<String>)> {
    let is_embed = span.starts_with('!');
    let inner_start = span.find("[[")? + 2;
    let inner_end = span.len() - 2;
    if inner_end <= inner_start {
        return None;
    }
    let inner = &span[inner_start..inner_end];
    let (target, display) = match inner.split_once('|') {
        Some((t, d)) => (t, Some(d)),
        None => (inner, None),
    };
    let target_lower = target.to_lowercase();

    let (entity, _) = index.by_alias(&target_lower)?;
    if entity.name_lower == target_lower {
        return None;
    }

    let display = display.unwrap_or(target);
    let prefix = if is_embed { "!" } else { "" };
    let rewritten = format!("{prefix}[[{}|{}]]", entity.canonical_name, display);
    Some((rewritten, Some(entity.canonical_name.clone())))
}

/// Auto-link pass: for each candidate and each surface form, find the first
/// whole-word occurrence outside fences/tables/quotes/HRs/existing links and
/// wrap it.
fn autolink_candidates(content: &str, candidates: &[Candidate], index: &EntityIndexData, links_added: &mut usize, touched: &mut HashSet<String>) -> String {
    let mut result = content.to_string();

    for candidate in candidates {
        let mut surface_forms = vec![candidate.canonical_name.clone()];
        if let Some(entity) = index.by_name_lower(&candidate.canonical_name.to_lowercase()) {
            surface_forms.extend(entity.aliases.iter().cloned());
        }
        // Longest surface form first, resolved greedily left-to-right, per
        // the ambiguity guidance in §9 ("Jordan" inside "Jordan Smith").
        surface_forms.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

        for surface in surface_forms {
            if let Some(new_content) = insert_first_occurrence(&result, &surface, &candidate.canonical_name) {
                result = new_content;
                *links_added += 1;
                touched.insert(candidate.canonical_name.clone());
                break;
            }
        }
    }

    result
}

fn insert_first_occurrence(content: &str, surface: &str, canonical: &str) -> Option<String> {
    let exclusion_spans = excluded_ranges(content);
    let link_ranges: Vec<(usize, usize)> = link_spans(content);

    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(surface))).ok()?;
    for m in pattern.find_iter(content) {
        let (start, end) = (m.start(), m.end());
        if exclusion_spans.iter().any(|(s, e)| start >= *s && end <= *e) {
            continue;
        }
        if link_ranges.iter().any(|(s, e)| start >= *s && end <= *e) {
            continue;
        }

        let matched_text = &content[start..end];
        let replacement = if matched_text.eq_ignore_ascii_case(canonical) {
            format!("[[{canonical}]]")
        } else {
            format!("[[{canonical}|{matched_text}]]")
        };

        let mut out = String::with_capacity(content.len() + replacement.len());
        out.push_str(&content[..start]);
        out.push_str(&replacement);
        out.push_str(&content[end..]);
        return Some(out);
    }
    None
}

/// Byte ranges that auto-linking must not touch: fenced code blocks, inline
/// code spans, table rows, block quotes, and horizontal rules.
fn excluded_ranges(content: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        let stripped_leading = trimmed.trim_start();

        if stripped_leading.starts_with("```") {
            in_fence = !in_fence;
            ranges.push((offset, offset + line.len()));
        } else if in_fence
            || stripped_leading.starts_with('|')
            || stripped_leading.starts_with('>')
            || is_horizontal_rule(stripped_leading)
        {
            ranges.push((offset, offset + line.len()));
        } else {
            for (start, end) in inline_code_spans(trimmed) {
                ranges.push((offset + start, offset + end));
            }
        }
        offset += line.len();
    }
    ranges
}

fn is_horizontal_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-') || compact.chars().all(|c| c == '*') || compact.chars().all(|c| c == '_'))
}

fn inline_code_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut open: Option<usize> = None;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            match open {
                Some(start) => {
                    spans.push((start, i + 1));
                    open = None;
                }
                None => open = Some(i),
            }
        }
        i += 1;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Category, Entity};
    use crate::store::StateStore;
    use std::collections::HashMap as StdHashMap;

    fn index_with_mcp_and_api() -> EntityIndexData {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut mcp = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        mcp.add_alias("Model Context Protocol");
        store.upsert_entity(&mcp).unwrap();
        let api = Entity::new("API", "tech/api.md", Category::Technology);
        store.upsert_entity(&api).unwrap();

        let mut index = crate::entity_index::EntityIndex::new();
        index.rebuild(&store).unwrap();
        (*index.snapshot()).clone()
    }

    fn candidate(name: &str) -> Candidate {
        Candidate {
            canonical_name: name.to_string(),
            final_score: 20.0,
            breakdown: StdHashMap::new(),
        }
    }

    #[test]
    fn alias_resolution_scenario_from_spec() {
        let index = index_with_mcp_and_api();
        let content = "Using [[model context protocol]] for integration";
        let result = Linker::link(content, &[], &index);
        assert_eq!(result.content, "Using [[MCP|model context protocol]] for integration");
        assert_eq!(result.links_added, 1);
    }

    #[test]
    fn first_occurrence_autolink_scenario_from_spec() {
        let index = index_with_mcp_and_api();
        let content = "Using [[model context protocol]] with API calls";
        let candidates = vec![candidate("API")];
        let result = Linker::link(content, &candidates, &index);
        assert_eq!(result.content, "Using [[MCP|model context protocol]] with [[API]] calls");
        assert_eq!(result.links_added, 2);
    }

    #[test]
    fn never_double_wraps() {
        let index = index_with_mcp_and_api();
        let content = "[[API]] is great";
        let candidates = vec![candidate("API")];
        let result = Linker::link(content, &candidates, &index);
        assert_eq!(result.content, "[[API]] is great");
        assert_eq!(result.links_added, 0);
    }

    #[test]
    fn skips_code_fences_and_tables() {
        let index = index_with_mcp_and_api();
        let content = "```\nAPI inside fence\n```\n| API | col |\n|-|-|\nAPI outside";
        let candidates = vec![candidate("API")];
        let result = Linker::link(content, &candidates, &index);
        assert!(result.content.contains("[[API]] outside") || result.content.ends_with("[[API]] outside"));
        assert!(!result.content.contains("[[API]] inside fence"));
    }

    #[test]
    fn idempotent_on_second_pass() {
        let index = index_with_mcp_and_api();
        let content = "Using [[model context protocol]] with API calls";
        let candidates = vec![candidate("API")];
        let once = Linker::link(content, &candidates, &index);
        let twice = Linker::link(&once.content, &candidates, &index);
        assert_eq!(once.content, twice.content);
    }
}
