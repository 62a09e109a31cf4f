//! The `Entity` data model (§3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Technology,
    Person,
    Project,
    Organization,
    Location,
    Concept,
    Acronym,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Person => "person",
            Category::Project => "project",
            Category::Organization => "organization",
            Category::Location => "location",
            Category::Concept => "concept",
            Category::Acronym => "acronym",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "technology" => Category::Technology,
            "person" => Category::Person,
            "project" => Category::Project,
            "organization" => Category::Organization,
            "location" => Category::Location,
            "concept" => Category::Concept,
            "acronym" => Category::Acronym,
            "other" => Category::Other,
            _ => return None,
        })
    }

    /// `type_boost` layer weight (§4.6).
    pub fn type_boost(self) -> f64 {
        match self {
            Category::Person => 5.0,
            Category::Project => 3.0,
            Category::Organization => 2.0,
            Category::Concept | Category::Technology | Category::Acronym | Category::Location | Category::Other => 0.0,
        }
    }
}

pub const MAX_ALIAS_LEN: usize = 25;
pub const MAX_ALIAS_WORDS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub canonical_name: String,
    pub name_lower: String,
    pub path: String,
    pub category: Category,
    pub aliases: Vec<String>,
    pub hub_score: i64,
}

impl Entity {
    /// Construct an entity, normalizing `name_lower` and dropping any alias
    /// that violates the length/word-count rule (§3 invariants).
    pub fn new(canonical_name: impl Into<String>, path: impl Into<String>, category: Category) -> Self {
        let canonical_name = canonical_name.into();
        let name_lower = canonical_name.to_lowercase();
        Self {
            canonical_name,
            name_lower,
            path: path.into(),
            category,
            aliases: Vec::new(),
            hub_score: 0,
        }
    }

    /// Add `alias` if it satisfies the alias rules; returns whether it was
    /// added. Preserves insertion order; rejects duplicates.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        if !is_valid_alias(&alias) {
            return false;
        }
        let alias_lower = alias.to_lowercase();
        if alias_lower == self.name_lower {
            return false;
        }
        if self.aliases.iter().any(|a| a.to_lowercase() == alias_lower) {
            return false;
        }
        self.aliases.push(alias);
        true
    }

    pub fn word_count(&self) -> usize {
        self.canonical_name.split_whitespace().count()
    }
}

pub fn is_valid_alias(alias: &str) -> bool {
    if alias.chars().count() > MAX_ALIAS_LEN {
        return false;
    }
    let word_count = alias.split_whitespace().filter(|w| !w.is_empty()).count();
    word_count >= 1 && word_count <= MAX_ALIAS_WORDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lower_is_derived() {
        let e = Entity::new("Model Context Protocol", "tech/mcp.md", Category::Technology);
        assert_eq!(e.name_lower, "model context protocol");
    }

    #[test]
    fn rejects_overlong_alias() {
        let mut e = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        assert!(!e.add_alias("a very long alias that exceeds twenty five characters"));
        assert!(e.aliases.is_empty());
    }

    #[test]
    fn rejects_alias_with_too_many_words() {
        let mut e = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        assert!(!e.add_alias("one two three four"));
    }

    #[test]
    fn accepts_valid_alias() {
        let mut e = Entity::new("MCP", "tech/mcp.md", Category::Technology);
        assert!(e.add_alias("Model Context Protocol"));
        assert_eq!(e.aliases, vec!["Model Context Protocol".to_string()]);
    }

    #[test]
    fn type_boosts_match_spec() {
        assert_eq!(Category::Person.type_boost(), 5.0);
        assert_eq!(Category::Project.type_boost(), 3.0);
        assert_eq!(Category::Organization.type_boost(), 2.0);
        assert_eq!(Category::Technology.type_boost(), 0.0);
    }
}
