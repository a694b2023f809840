//! SQL migration definitions for the ScholarScout database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations` as its last statement.

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
            description: "Initial schema: scholarships, fetch_runs, counters",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Scholarship corpus
CREATE TABLE IF NOT EXISTS scholarships (
    id             TEXT PRIMARY KEY,
    identity_key   TEXT NOT NULL UNIQUE,
    title          TEXT NOT NULL,
    organization   TEXT NOT NULL,
    country        TEXT NOT NULL,
    level          TEXT NOT NULL,
    field          TEXT NOT NULL,
    category       TEXT NOT NULL,
    deadline       TEXT NOT NULL,
    description    TEXT NOT NULL,
    link           TEXT NOT NULL,
    amount         TEXT,
    currency       TEXT,
    human_verified INTEGER NOT NULL DEFAULT 0,
    source         TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scholarships_deadline ON scholarships(deadline);
CREATE INDEX IF NOT EXISTS idx_scholarships_country ON scholarships(country);

-- Fetch run log
CREATE TABLE IF NOT EXISTS fetch_runs (
    id           TEXT PRIMARY KEY,
    queries_json TEXT NOT NULL,
    status       TEXT NOT NULL,
    found        INTEGER NOT NULL DEFAULT 0,
    added        INTEGER NOT NULL DEFAULT 0,
    error        TEXT,
    started_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_fetch_runs_started ON fetch_runs(started_at);

-- Monotonic counters (query batch rotation)
CREATE TABLE IF NOT EXISTS counters (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
