//! The 12-layer candidate ranker (§4.6).

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::config::Strictness;
use crate::entity::Entity;
use crate::entity_index::EntityIndexData;
use crate::recency::RecencyBuilder;
use crate::store::{SuggestionEventRow, StateStore};
use crate::tokenizer::{self, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    ExactMatch,
    AliasMatch,
    StemMatch,
    TypeBoost,
    ContextBoost,
    CrossFolderBoost,
    HubBoost,
    RecencyBoost,
    CooccurrenceBoost,
    FeedbackBoost,
}

impl Layer {
    pub fn key(self) -> &'static str {
        match self {
            Layer::ExactMatch => "exact_match",
            Layer::AliasMatch => "alias_match",
            Layer::StemMatch => "stem_match",
            Layer::TypeBoost => "type_boost",
            Layer::ContextBoost => "context_boost",
            Layer::CrossFolderBoost => "cross_folder_boost",
            Layer::HubBoost => "hub_boost",
            Layer::RecencyBoost => "recency_boost",
            Layer::CooccurrenceBoost => "cooccurrence_boost",
            Layer::FeedbackBoost => "feedback_boost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScorerOptions {
    pub strictness: Strictness,
    pub note_path: Option<String>,
    pub disabled_layers: HashSet<Layer>,
    pub exclude_linked: bool,
    pub max_suggestions: usize,
}

impl Default for ScorerOptions {
    fn default() -> Self {
        Self {
            strictness: Strictness::Conservative,
            note_path: None,
            disabled_layers: HashSet::new(),
            exclude_linked: true,
            max_suggestions: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub canonical_name: String,
    pub final_score: f64,
    pub breakdown: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreResult {
    pub suggestions: Vec<Candidate>,
    pub suffix: String,
}

const ONE_STEM_MATCH_FLOOR: f64 = 5.0;
const COOCCURRENCE_WEIGHT: f64 = 2.0;
const COOCCURRENCE_CAP: f64 = 4.0;

/// Context tag for `notePath`, used by `context_boost` and suppression scoping.
pub fn context_tag(note_path: Option<&str>) -> &'static str {
    let Some(path) = note_path else { return "general" };
    if path.starts_with("daily-notes/") || path.starts_with("journal/") {
        "daily"
    } else if path.starts_with("projects/") {
        "project"
    } else if path.starts_with("tech/") {
        "technology"
    } else if path.starts_with("concepts/") {
        "concept"
    } else {
        "general"
    }
}

fn article_title_pattern() -> Regex {
    Regex::new(r"(?i)^(guide to|how to|complete .+|ultimate .+|.+tutorial|.+cheatsheet|.+cheat sheet|.+worksheet|.+checklist|best practices|introduction to)$")
        .expect("static article-title pattern is valid")
}

fn suffix_already_present() -> Regex {
    Regex::new(r"→ (\[\[[^\]]+\]\]\s*)+\s*$").expect("static suffix pattern is valid")
}

pub struct Scorer;

impl Scorer {
    pub fn score(content: &str, options: &ScorerOptions, index: &EntityIndexData, store: &StateStore, now_ms: i64) -> ScoreResult {
        if index.is_empty() {
            return ScoreResult::default();
        }

        let tokenized = tokenize(content);
        let already_linked = extract_already_linked(content, index);
        let ctx_tag = context_tag(options.note_path.as_deref());

        let mut candidates: Vec<Candidate> = Vec::new();
        let article_title = article_title_pattern();

        for entity in index.all() {
            if entity.canonical_name.chars().count() > 25 {
                continue;
            }
            if entity.word_count() > 3 {
                continue;
            }
            if article_title.is_match(&entity.canonical_name) {
                continue;
            }
            if options.exclude_linked && already_linked.contains(&entity.name_lower) {
                continue;
            }
            if let Some(note_path) = &options.note_path {
                if !entity.path.is_empty() && note_path == &entity.path {
                    continue;
                }
            }
            if store.is_suppressed(&entity.name_lower, ctx_tag).unwrap_or(false) {
                continue;
            }

            let (score, breakdown, matched_fraction, has_content_overlap) =
                score_candidate(entity, &tokenized, options, index, store, &already_linked, now_ms);

            if entity.word_count() >= 2 && matched_fraction < 0.4 {
                continue;
            }
            if !has_content_overlap {
                continue;
            }

            candidates.push(Candidate {
                canonical_name: entity.canonical_name.clone(),
                final_score: score,
                breakdown,
            });
        }

        let base_threshold = options.strictness.base_threshold();
        let len = content.chars().count();
        let multiplier = if len < 50 {
            0.6
        } else if len > 200 {
            1.2
        } else {
            1.0
        };
        let adjusted_threshold = base_threshold * multiplier;

        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });

        for candidate in &candidates {
            let passed = candidate.final_score >= adjusted_threshold && candidate.final_score >= ONE_STEM_MATCH_FLOOR;
            store.record_suggestion_event(&SuggestionEventRow {
                id: 0,
                timestamp_ms: now_ms,
                note_path: options.note_path.clone(),
                entity_name: candidate.canonical_name.clone(),
                final_score: candidate.final_score,
                threshold: adjusted_threshold,
                passed,
                breakdown: candidate.breakdown.clone(),
                strictness: format!("{:?}", options.strictness).to_lowercase(),
                context_tag: ctx_tag.to_string(),
            });
        }

        let mut passed: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.final_score >= adjusted_threshold && c.final_score >= ONE_STEM_MATCH_FLOOR)
            .collect();
        passed.truncate(options.max_suggestions);

        let suffix = if passed.is_empty() || suffix_already_present().is_match(content) {
            String::new()
        } else {
            let links: Vec<String> = passed.iter().map(|c| format!("[[{}]]", c.canonical_name)).collect();
            format!("→ {}", links.join(" "))
        };

        ScoreResult {
            suggestions: passed,
            suffix,
        }
    }
}

fn extract_already_linked(content: &str, index: &EntityIndexData) -> HashSet<String> {
    let mut linked = HashSet::new();
    for link in wiki_links::parse_wiki_links(content) {
        let lower = link.name.to_lowercase();
        linked.insert(lower.clone());
        if let Some((entity, _)) = index.by_alias(&lower) {
            linked.insert(entity.name_lower.clone());
        }
    }
    linked
}

fn layer_enabled(options: &ScorerOptions, layer: Layer) -> bool {
    !options.disabled_layers.contains(&layer)
}

#[allow(clippy::too_many_arguments)]
fn score_candidate(
    entity: &Entity,
    tokenized: &tokenizer::TokenizedText,
    options: &ScorerOptions,
    index: &EntityIndexData,
    store: &StateStore,
    already_linked: &HashSet<String>,
    now_ms: i64,
) -> (f64, HashMap<String, f64>, f64, bool) {
    let mut breakdown = HashMap::new();
    let mut total = 0.0;
    let mut has_overlap = false;

    let name_words: Vec<String> = entity
        .canonical_name
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    let mut matched_words: HashSet<String> = HashSet::new();

    // exact_match
    if layer_enabled(options, Layer::ExactMatch) {
        let mut score = 0.0;
        for word in &name_words {
            if tokenized.token_set.contains(word) {
                score += 10.0;
                matched_words.insert(word.clone());
                has_overlap = true;
            }
        }
        if score > 0.0 {
            *breakdown.entry(Layer::ExactMatch.key().to_string()).or_insert(0.0) += score;
            total += score;
        }
    }

    // alias_match
    if layer_enabled(options, Layer::AliasMatch) {
        let mut best = 0.0_f64;
        for alias in &entity.aliases {
            let alias_lower = alias.to_lowercase();
            let alias_words: Vec<&str> = alias_lower.split_whitespace().collect();
            let mut score = 0.0;
            for word in &alias_words {
                if tokenized.token_set.contains(*word) {
                    score += 10.0;
                    matched_words.insert(word.to_string());
                    has_overlap = true;
                }
            }
            if contains_contiguous_phrase(&tokenized.tokens, &alias_words) {
                score += 8.0;
                has_overlap = true;
            }
            best = best.max(score);
        }
        if best > 0.0 {
            *breakdown.entry(Layer::AliasMatch.key().to_string()).or_insert(0.0) += best;
            total += best;
        }
    }

    // stem_match
    if layer_enabled(options, Layer::StemMatch) {
        let mut score = 0.0;
        let mut surface_forms: Vec<&str> = name_words.iter().map(|w| w.as_str()).collect();
        for alias in &entity.aliases {
            surface_forms.extend(alias.split_whitespace());
        }
        for word in surface_forms {
            let lower = word.to_lowercase();
            if matched_words.contains(&lower) {
                continue;
            }
            let stem = tokenizer::stem(&lower);
            if tokenized.stems.contains(&stem) {
                score += 5.0;
                has_overlap = true;
            }
        }
        if score > 0.0 {
            *breakdown.entry(Layer::StemMatch.key().to_string()).or_insert(0.0) += score;
            total += score;
        }
    }

    // type_boost
    if layer_enabled(options, Layer::TypeBoost) {
        let boost = entity.category.type_boost();
        if boost != 0.0 {
            breakdown.insert(Layer::TypeBoost.key().to_string(), boost);
            total += boost;
        }
    }

    // context_boost
    if layer_enabled(options, Layer::ContextBoost) {
        let tag = context_tag(options.note_path.as_deref());
        let boost = match (tag, entity.category) {
            ("daily", crate::entity::Category::Person) => 5.0,
            ("project", crate::entity::Category::Project) => 5.0,
            ("technology", crate::entity::Category::Technology) => 5.0,
            ("concept", crate::entity::Category::Concept) => 5.0,
            _ => 0.0,
        };
        if boost != 0.0 {
            breakdown.insert(Layer::ContextBoost.key().to_string(), boost);
            total += boost;
        }
    }

    // cross_folder_boost
    if layer_enabled(options, Layer::CrossFolderBoost) {
        if let Some(note_path) = &options.note_path {
            let note_root = note_path.split('/').next().unwrap_or("");
            let entity_root = entity.path.split('/').next().unwrap_or("");
            if !entity.path.is_empty() && note_root != entity_root {
                breakdown.insert(Layer::CrossFolderBoost.key().to_string(), 3.0);
                total += 3.0;
            }
        }
    }

    // hub_boost
    if layer_enabled(options, Layer::HubBoost) && entity.hub_score >= 5 {
        breakdown.insert(Layer::HubBoost.key().to_string(), 3.0);
        total += 3.0;
    }

    // recency_boost
    if layer_enabled(options, Layer::RecencyBoost) {
        let last_mention = store.last_mention(&entity.name_lower).unwrap_or(None);
        let boost = RecencyBuilder::boost_for(last_mention, now_ms);
        if boost != 0.0 {
            breakdown.insert(Layer::RecencyBoost.key().to_string(), boost);
            total += boost;
        }
    }

    // cooccurrence_boost
    if layer_enabled(options, Layer::CooccurrenceBoost) {
        let mut boost_sum = 0.0;
        let df_cand = store.document_frequency(&entity.name_lower).unwrap_or(0);
        let total_notes = store.read_cooccurrence().map(|s| s.total_notes_scanned).unwrap_or(0);
        for linked in already_linked {
            if linked == &entity.name_lower {
                continue;
            }
            let df_linked = store.document_frequency(linked).unwrap_or(0);
            let cooc = store.cooccurrence_count(linked, &entity.name_lower).unwrap_or(0);
            let value = crate::cooccurrence::npmi(cooc, df_linked, df_cand, total_notes);
            boost_sum += value * COOCCURRENCE_WEIGHT;
        }
        let boost = boost_sum.min(COOCCURRENCE_CAP);
        if boost > 0.0 {
            breakdown.insert(Layer::CooccurrenceBoost.key().to_string(), boost);
            total += boost;
        }
    }

    // feedback_boost
    if layer_enabled(options, Layer::FeedbackBoost) {
        if let Ok(Some(accuracy)) = store.feedback_accuracy(&entity.name_lower) {
            let boost = if accuracy >= 0.95 {
                5.0
            } else if accuracy >= 0.80 {
                2.0
            } else if accuracy >= 0.60 {
                0.0
            } else if accuracy >= 0.40 {
                -2.0
            } else {
                -4.0
            };
            if boost != 0.0 {
                breakdown.insert(Layer::FeedbackBoost.key().to_string(), boost);
                total += boost;
            }
        }
    }

    // A name word counts as "matched" (for the multi-word threshold) if it
    // matched exactly or shares a stem with content.
    let mut matched_name_word_count = 0;
    for word in &name_words {
        if matched_words.contains(word) || tokenized.stems.contains(&tokenizer::stem(word)) {
            matched_name_word_count += 1;
        }
    }
    let matched_fraction = if name_words.is_empty() {
        0.0
    } else {
        matched_name_word_count as f64 / name_words.len() as f64
    };

    // Zero-content-overlap filter (§4.6 step 6): also checks alias words for
    // token or stem overlap, independent of the boosts above.
    if !has_overlap {
        let mut surface_forms: Vec<String> = name_words.clone();
        for alias in &entity.aliases {
            surface_forms.extend(alias.split_whitespace().map(|w| w.to_lowercase()));
        }
        for word in surface_forms {
            if tokenized.token_set.contains(&word) || tokenized.stems.contains(&tokenizer::stem(&word)) {
                has_overlap = true;
                break;
            }
        }
    }

    (total, breakdown, matched_fraction, has_overlap)
}

fn contains_contiguous_phrase(tokens: &[String], phrase_words: &[&str]) -> bool {
    if phrase_words.is_empty() || phrase_words.len() > tokens.len() {
        return false;
    }
    tokens.windows(phrase_words.len()).any(|window| {
        window.iter().zip(phrase_words.iter()).all(|(a, b)| a == b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Category;

    fn seeded(content_note_path: Option<&str>) -> (StateStore, EntityIndexData, ScorerOptions) {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut mcp = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        mcp.add_alias("Model Context Protocol");
        store.upsert_entity(&mcp).unwrap();
        let complete_guide = Entity::new("Complete Guide", "meta/guide.md", Category::Concept);
        store.upsert_entity(&complete_guide).unwrap();

        let mut index = crate::entity_index::EntityIndex::new();
        index.rebuild(&store).unwrap();
        let snapshot = (*index.snapshot()).clone();

        let mut options = ScorerOptions::default();
        options.note_path = content_note_path.map(String::from);
        (store, snapshot, options)
    }

    #[test]
    fn article_title_filter_excludes_complete_guide() {
        let (store, index, mut options) = seeded(None);
        options.strictness = Strictness::Aggressive;
        let result = Scorer::score("Completed 0.5.1 of Flywheel Crank", &options, &index, &store, 1_000);
        assert!(result.suggestions.iter().all(|c| c.canonical_name != "Complete Guide"));
    }

    #[test]
    fn alias_full_phrase_resolves_to_canonical_candidate() {
        let (store, index, mut options) = seeded(None);
        options.strictness = Strictness::Aggressive;
        let result = Scorer::score("Using model context protocol for integration", &options, &index, &store, 1_000);
        assert!(result.suggestions.iter().any(|c| c.canonical_name == "MCP"));
    }
}
