//! SQLite schema for the CodeAtlas relational store.
//!
//! Mirrors spec §3/§6.3 1-for-1. `CREATE TABLE IF NOT EXISTS` plus explicit
//! indexes, following the teacher's `lazy::schema` constant style. Foreign
//! keys implement the cascade/set-null ownership chain directly so deleting
//! a Repository or File propagates without application-level fan-out.

pub const SCHEMA_VERSION: &str = "1.0";

pub const PRAGMA_FOREIGN_KEYS: &str = "PRAGMA foreign_keys = ON;";

pub const SCHEMA_CREATE_REPOSITORIES: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    repo_id     TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL UNIQUE,
    url         TEXT,
    branch      TEXT NOT NULL,
    commit_hash TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
)
"#;

pub const SCHEMA_CREATE_FILES: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file_id    TEXT PRIMARY KEY NOT NULL,
    repo_id    TEXT NOT NULL REFERENCES repositories(repo_id) ON DELETE CASCADE,
    path       TEXT NOT NULL,
    language   TEXT NOT NULL,
    size       INTEGER NOT NULL,
    checksum   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(repo_id, path)
)
"#;

pub const SCHEMA_CREATE_SYMBOLS: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    symbol_id         TEXT PRIMARY KEY NOT NULL,
    file_id           TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    name              TEXT NOT NULL,
    kind              TEXT NOT NULL,
    signature         TEXT,
    start_line        INTEGER NOT NULL,
    end_line          INTEGER NOT NULL,
    start_byte        INTEGER NOT NULL,
    end_byte          INTEGER NOT NULL,
    docstring         TEXT,
    semantic_summary  TEXT,
    UNIQUE(file_id, name, start_line, start_byte)
)
"#;

pub const SCHEMA_CREATE_AST_NODES: &str = r#"
CREATE TABLE IF NOT EXISTS ast_nodes (
    node_id    TEXT PRIMARY KEY NOT NULL,
    file_id    TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    node_type  TEXT NOT NULL,
    parent_id  TEXT REFERENCES ast_nodes(node_id) ON DELETE CASCADE,
    start_line INTEGER NOT NULL,
    end_line   INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte   INTEGER NOT NULL,
    text       TEXT,
    attributes_json TEXT NOT NULL DEFAULT '{}'
)
"#;

/// `UNIQUE(source_id, target_id, edge_type)` is defense-in-depth for
/// resolved edges (non-null `target_id`); the primary dedup mechanism is
/// `edge_id` itself being deterministically derived from that same key
/// (plus `target_module`/`target_file` for the unresolved case SQLite's
/// NULL-distinct UNIQUE semantics can't cover) — see
/// `codeatlas-orchestrator::convert::derive_edge_id`.
pub const SCHEMA_CREATE_EDGES: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    edge_id       TEXT PRIMARY KEY NOT NULL,
    source_id     TEXT NOT NULL REFERENCES symbols(symbol_id) ON DELETE CASCADE,
    target_id     TEXT REFERENCES symbols(symbol_id) ON DELETE SET NULL,
    edge_type     TEXT NOT NULL,
    source_file   TEXT NOT NULL,
    target_file   TEXT,
    target_module TEXT,
    line_number   INTEGER,
    UNIQUE(source_id, target_id, edge_type)
)
"#;

pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_files_repo ON files(repo_id);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_ast_nodes_file ON ast_nodes(file_id);
CREATE INDEX IF NOT EXISTS idx_ast_nodes_parent ON ast_nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
"#;

pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// Create every table, index, and the metadata row recording the schema
/// version. Idempotent — safe to call on every connection open.
pub fn initialize(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(PRAGMA_FOREIGN_KEYS)?;
    conn.execute(SCHEMA_CREATE_REPOSITORIES, [])?;
    conn.execute(SCHEMA_CREATE_FILES, [])?;
    conn.execute(SCHEMA_CREATE_SYMBOLS, [])?;
    conn.execute(SCHEMA_CREATE_AST_NODES, [])?;
    conn.execute(SCHEMA_CREATE_EDGES, [])?;
    conn.execute(SCHEMA_CREATE_METADATA, [])?;
    conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
    conn.execute(
        "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}
