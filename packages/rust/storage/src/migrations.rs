//! SQL migration definitions for the writerpack database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: keyword_cache, pack_log",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Daily keyword summaries, one row per (day, platform)
CREATE TABLE IF NOT EXISTS keyword_cache (
    cache_date    TEXT NOT NULL,
    platform      TEXT NOT NULL,
    keywords_json TEXT NOT NULL,
    raw_row_count INTEGER NOT NULL,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (cache_date, platform)
);

-- Audit log of assembled packs
CREATE TABLE IF NOT EXISTS pack_log (
    pack_id          TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    created_by       TEXT NOT NULL,
    topic            TEXT NOT NULL,
    audience         TEXT NOT NULL,
    structure_used   TEXT NOT NULL,
    title            TEXT NOT NULL,
    keywords         TEXT NOT NULL,
    sources          TEXT NOT NULL,
    dropped_sources  TEXT NOT NULL DEFAULT '',
    internal_links   TEXT NOT NULL,
    social_json      TEXT NOT NULL,
    article_body     TEXT NOT NULL,
    body_sha256      TEXT NOT NULL,
    research_policy  TEXT NOT NULL,
    degraded         INTEGER NOT NULL,
    metadata_json    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pack_log_created ON pack_log(created_at);

-- The log is append-only
CREATE TRIGGER IF NOT EXISTS pack_log_no_update BEFORE UPDATE ON pack_log BEGIN
    SELECT RAISE(ABORT, 'pack_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS pack_log_no_delete BEFORE DELETE ON pack_log BEGIN
    SELECT RAISE(ABORT, 'pack_log is append-only');
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
