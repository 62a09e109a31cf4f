//! Ordered, forward-only migrations keyed by a monotonically increasing
//! schema version (§3 lifecycle, §6).

use rusqlite::Connection;

use crate::error::{EngineError, EngineResult};

pub const LATEST_VERSION: i64 = 1;

const MIGRATIONS: &[&str] = &[
    // v1: initial schema.
    r#"
    CREATE TABLE IF NOT EXISTS entities (
        name_lower      TEXT PRIMARY KEY,
        canonical_name  TEXT NOT NULL UNIQUE,
        path            TEXT NOT NULL DEFAULT '',
        category        TEXT NOT NULL,
        hub_score       INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS aliases (
        name_lower  TEXT NOT NULL REFERENCES entities(name_lower) ON DELETE CASCADE,
        alias       TEXT NOT NULL,
        alias_lower TEXT NOT NULL,
        ord         INTEGER NOT NULL,
        PRIMARY KEY (name_lower, alias_lower)
    );
    CREATE INDEX IF NOT EXISTS idx_aliases_alias_lower ON aliases(alias_lower);

    CREATE TABLE IF NOT EXISTS entity_recency (
        name_lower              TEXT PRIMARY KEY REFERENCES entities(name_lower) ON DELETE CASCADE,
        last_mention_epoch_ms   INTEGER NOT NULL,
        scan_finished_at_epoch_ms INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cooccurrence_meta (
        id                  INTEGER PRIMARY KEY CHECK (id = 1),
        total_notes_scanned INTEGER NOT NULL DEFAULT 0,
        min_count_threshold INTEGER NOT NULL DEFAULT 1,
        generated_at        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS cooccurrence_document_frequency (
        name_lower TEXT PRIMARY KEY,
        count      INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cooccurrence_pairs (
        a     TEXT NOT NULL,
        b     TEXT NOT NULL,
        count INTEGER NOT NULL,
        PRIMARY KEY (a, b),
        CHECK (a < b)
    );

    CREATE TABLE IF NOT EXISTS note_links (
        note_path        TEXT NOT NULL,
        target           TEXT NOT NULL,
        weight           REAL NOT NULL DEFAULT 1.0,
        weight_updated_at INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (note_path, target)
    );

    CREATE TABLE IF NOT EXISTS note_link_history (
        note_path      TEXT NOT NULL,
        target         TEXT NOT NULL,
        edits_survived INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (note_path, target)
    );

    CREATE TABLE IF NOT EXISTS tool_invocations (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        tool_name   TEXT NOT NULL,
        session_id  TEXT NOT NULL,
        note_paths  TEXT NOT NULL,
        timestamp_ms INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL,
        success     INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tool_invocations_session ON tool_invocations(session_id);

    CREATE TABLE IF NOT EXISTS suggestion_events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp_ms INTEGER NOT NULL,
        note_path   TEXT,
        entity_name TEXT NOT NULL,
        final_score REAL NOT NULL,
        threshold   REAL NOT NULL,
        passed      INTEGER NOT NULL,
        breakdown   TEXT NOT NULL,
        strictness  TEXT NOT NULL,
        context_tag TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_suggestion_events_entity ON suggestion_events(entity_name);

    CREATE TABLE IF NOT EXISTS wikilink_applications (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        note_path     TEXT NOT NULL,
        target        TEXT NOT NULL,
        applied_at_ms INTEGER NOT NULL,
        still_present INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS wikilink_feedback (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_name TEXT NOT NULL,
        note_path   TEXT,
        context_tag TEXT NOT NULL,
        positive    INTEGER NOT NULL,
        weight      REAL NOT NULL DEFAULT 1.0,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_wikilink_feedback_entity ON wikilink_feedback(entity_name);

    CREATE TABLE IF NOT EXISTS wikilink_suppressions (
        entity_name     TEXT NOT NULL,
        context_tag     TEXT NOT NULL,
        negative_count  INTEGER NOT NULL DEFAULT 0,
        suppressed_at_ms INTEGER NOT NULL,
        PRIMARY KEY (entity_name, context_tag)
    );

    CREATE TABLE IF NOT EXISTS memories (
        key         TEXT PRIMARY KEY,
        value       TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        confidence  REAL NOT NULL DEFAULT 1.0,
        created_at_ms  INTEGER NOT NULL,
        updated_at_ms  INTEGER NOT NULL,
        accessed_at_ms INTEGER NOT NULL,
        ttl_days    INTEGER
    );

    CREATE TABLE IF NOT EXISTS mutation_hints (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp_ms INTEGER NOT NULL,
        path        TEXT NOT NULL,
        operation   TEXT NOT NULL,
        before_hash TEXT NOT NULL,
        after_hash  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS engine_state (
        key        TEXT PRIMARY KEY,
        value_blob TEXT NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS graph_snapshots (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        taken_at_ms INTEGER NOT NULL,
        avg_degree  REAL NOT NULL,
        max_degree  INTEGER NOT NULL,
        cluster_count INTEGER NOT NULL,
        largest_cluster_size INTEGER NOT NULL,
        top_hubs    TEXT NOT NULL
    );
    "#,
];

pub fn migrate(conn: &mut Connection) -> EngineResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )
    .map_err(|e| EngineError::store_error(format!("creating schema_version: {e}")))?;

    let current = current_version(conn)?;
    let tx = conn
        .transaction()
        .map_err(|e| EngineError::store_error(format!("starting migration transaction: {e}")))?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        tx.execute_batch(migration)
            .map_err(|e| EngineError::store_error(format!("migration v{version} failed: {e}")))?;
        tx.execute("DELETE FROM schema_version", [])
            .map_err(|e| EngineError::store_error(e.to_string()))?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
            .map_err(|e| EngineError::store_error(e.to_string()))?;
    }

    tx.commit()
        .map_err(|e| EngineError::store_error(format!("committing migrations: {e}")))?;
    Ok(())
}

pub fn current_version(conn: &Connection) -> EngineResult<i64> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )
        .map_err(|e| EngineError::store_error(e.to_string()))?;
    if !exists {
        return Ok(0);
    }
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .or(Ok(0))
}
