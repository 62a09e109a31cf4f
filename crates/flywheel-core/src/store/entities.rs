//! Entity and alias persistence.

use rusqlite::{params, OptionalExtension};

use crate::entity::{Category, Entity};
use crate::error::{EngineError, EngineResult};

use super::StateStore;

#[derive(Debug, Clone)]
pub struct EntityRow {
    pub entity: Entity,
}

#[derive(Debug, Clone)]
pub struct AliasLookup {
    pub canonical_name: String,
    pub name_lower: String,
    pub alias_used: String,
}

impl StateStore {
    /// Insert or replace `entity`, including its ordered alias list.
    pub fn upsert_entity(&mut self, entity: &Entity) -> EngineResult<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO entities (name_lower, canonical_name, path, category, hub_score)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name_lower) DO UPDATE SET
                canonical_name = excluded.canonical_name,
                path = excluded.path,
                category = excluded.category,
                hub_score = excluded.hub_score",
            params![
                entity.name_lower,
                entity.canonical_name,
                entity.path,
                entity.category.as_str(),
                entity.hub_score,
            ],
        )?;

        tx.execute("DELETE FROM aliases WHERE name_lower = ?1", params![entity.name_lower])?;
        for (i, alias) in entity.aliases.iter().enumerate() {
            tx.execute(
                "INSERT INTO aliases (name_lower, alias, alias_lower, ord) VALUES (?1, ?2, ?3, ?4)",
                params![entity.name_lower, alias, alias.to_lowercase(), i as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn entity_by_name_lower(&self, name_lower: &str) -> EngineResult<Option<Entity>> {
        let row = self
            .conn()
            .query_row(
                "SELECT canonical_name, path, category, hub_score FROM entities WHERE name_lower = ?1",
                params![name_lower],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((canonical_name, path, category, hub_score)) = row else {
            return Ok(None);
        };
        let category = Category::parse(&category).ok_or_else(|| {
            EngineError::store_error(format!("corrupt category '{category}' for entity '{name_lower}'"))
        })?;

        let mut entity = Entity::new(canonical_name, path, category);
        entity.hub_score = hub_score;
        entity.aliases = self.aliases_for(name_lower)?;
        Ok(Some(entity))
    }

    /// Overwrite `hub_score` for an existing entity. No-op (not an error) if
    /// the entity doesn't exist, since a note-link target can outlive the
    /// entity it pointed to.
    pub fn update_hub_score(&self, name_lower: &str, hub_score: i64) -> EngineResult<()> {
        self.conn().execute(
            "UPDATE entities SET hub_score = ?1 WHERE name_lower = ?2",
            params![hub_score, name_lower],
        )?;
        Ok(())
    }

    fn aliases_for(&self, name_lower: &str) -> EngineResult<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT alias FROM aliases WHERE name_lower = ?1 ORDER BY ord ASC")?;
        let rows = stmt
            .query_map(params![name_lower], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Resolve `alias_lower` to its owning entity, if any.
    pub fn resolve_alias(&self, alias_lower: &str) -> EngineResult<Option<AliasLookup>> {
        let row = self
            .conn()
            .query_row(
                "SELECT e.canonical_name, e.name_lower, a.alias
                 FROM aliases a JOIN entities e ON e.name_lower = a.name_lower
                 WHERE a.alias_lower = ?1",
                params![alias_lower],
                |row| {
                    Ok(AliasLookup {
                        canonical_name: row.get(0)?,
                        name_lower: row.get(1)?,
                        alias_used: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// All entities, skipping any row whose `name_lower` is missing or whose
    /// category is corrupt (logged, not raised — §4.6 failure semantics).
    pub fn all_entities(&self) -> EngineResult<Vec<Entity>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT name_lower, canonical_name, path, category, hub_score FROM entities")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name_lower, canonical_name, path, category, hub_score) = row?;
            let Some(category) = Category::parse(&category) else {
                tracing::warn!(name_lower, category, "skipping entity with corrupt category");
                continue;
            };
            let mut entity = Entity::new(canonical_name, path, category);
            entity.hub_score = hub_score;
            entity.aliases = self.aliases_for(&name_lower)?;
            out.push(entity);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entity_with_aliases() {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut entity = Entity::new("Model Context Protocol", "tech/mcp.md", Category::Technology);
        entity.add_alias("MCP");
        entity.hub_score = 7;
        store.upsert_entity(&entity).unwrap();

        let fetched = store.entity_by_name_lower("model context protocol").unwrap().unwrap();
        assert_eq!(fetched.canonical_name, "Model Context Protocol");
        assert_eq!(fetched.aliases, vec!["MCP".to_string()]);
        assert_eq!(fetched.hub_score, 7);
    }

    #[test]
    fn resolves_alias_to_canonical() {
        let mut store = StateStore::open_in_memory().unwrap();
        let mut entity = Entity::new("Model Context Protocol", "tech/mcp.md", Category::Technology);
        entity.add_alias("MCP");
        store.upsert_entity(&entity).unwrap();

        let lookup = store.resolve_alias("mcp").unwrap().unwrap();
        assert_eq!(lookup.canonical_name, "Model Context Protocol");
        assert_eq!(lookup.alias_used, "MCP");
    }

    #[test]
    fn skips_corrupt_category_rows() {
        let mut store = StateStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO entities (name_lower, canonical_name, path, category, hub_score)
                 VALUES ('x', 'X', '', 'not-a-real-category', 0)",
                [],
            )
            .unwrap();
        assert!(store.all_entities().unwrap().is_empty());
    }
}
