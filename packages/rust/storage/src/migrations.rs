//! SQL migration definitions for the lexsync database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: words, lexemes, inflections, task_specs, sync_state",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Legacy flat word table (aggregated view, one row per lemma + pos)
CREATE TABLE IF NOT EXISTS words (
    lemma        TEXT NOT NULL,
    pos          TEXT NOT NULL,
    level        TEXT,
    approved     INTEGER NOT NULL DEFAULT 0,
    canonical    INTEGER NOT NULL DEFAULT 0,
    complete     INTEGER NOT NULL DEFAULT 0,
    payload_json TEXT NOT NULL,
    checksum     TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE(lemma, pos)
);

-- Canonical lexeme identities
CREATE TABLE IF NOT EXISTS lexemes (
    id             TEXT PRIMARY KEY,
    lemma          TEXT NOT NULL,
    language       TEXT NOT NULL,
    pos            TEXT NOT NULL,
    gender         TEXT,
    metadata_json  TEXT NOT NULL,
    frequency_rank INTEGER,
    sources_json   TEXT NOT NULL,
    checksum       TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lexemes_pos ON lexemes(pos);
CREATE INDEX IF NOT EXISTS idx_lexemes_updated_at ON lexemes(updated_at);

-- Surface forms
CREATE TABLE IF NOT EXISTS inflections (
    id              TEXT PRIMARY KEY,
    lexeme_id       TEXT NOT NULL REFERENCES lexemes(id) ON DELETE CASCADE,
    form            TEXT NOT NULL,
    features_json   TEXT NOT NULL,
    checksum        TEXT NOT NULL,
    source_revision TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inflections_lexeme ON inflections(lexeme_id);
CREATE INDEX IF NOT EXISTS idx_inflections_updated_at ON inflections(updated_at);

-- Generated practice tasks
CREATE TABLE IF NOT EXISTS task_specs (
    id            TEXT PRIMARY KEY,
    lexeme_id     TEXT NOT NULL REFERENCES lexemes(id) ON DELETE CASCADE,
    pos           TEXT NOT NULL,
    task_type     TEXT NOT NULL,
    renderer      TEXT NOT NULL,
    prompt_json   TEXT NOT NULL,
    solution_json TEXT NOT NULL,
    hints_json    TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    revision      INTEGER NOT NULL,
    checksum      TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_specs_lexeme ON task_specs(lexeme_id);
CREATE INDEX IF NOT EXISTS idx_task_specs_type ON task_specs(pos, task_type);

-- Small key/value store (sync marker)
CREATE TABLE IF NOT EXISTS sync_state (
    key        TEXT PRIMARY KEY,
    value      TEXT,
    updated_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Content packs and pack-lexeme map",
            sql: r#"
CREATE TABLE IF NOT EXISTS content_packs (
    id           TEXT PRIMARY KEY,
    slug         TEXT NOT NULL UNIQUE,
    name         TEXT NOT NULL,
    language     TEXT NOT NULL,
    level        TEXT,
    version      INTEGER NOT NULL,
    checksum     TEXT NOT NULL,
    lexeme_count INTEGER NOT NULL,
    generated_at TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pack_lexemes (
    pack_id   TEXT NOT NULL REFERENCES content_packs(id) ON DELETE CASCADE,
    lexeme_id TEXT NOT NULL REFERENCES lexemes(id) ON DELETE CASCADE,
    position  INTEGER NOT NULL,
    PRIMARY KEY (pack_id, lexeme_id)
);

CREATE INDEX IF NOT EXISTS idx_pack_lexemes_lexeme ON pack_lexemes(lexeme_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
