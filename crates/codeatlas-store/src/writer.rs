//! Relational Writer (C3) — batched, idempotent upserts across the five
//! owned entity kinds, per-file transactions, and retry with backoff on
//! transient errors (spec §4.3).

use crate::error::{classify_sqlite_error, Result, StoreError};
use crate::pool::ConnectionPool;
use codeatlas_core::{AstNode, Edge, File, Repository, Symbol};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay: DEFAULT_BASE_RETRY_DELAY,
        }
    }
}

/// Per-item result of a batched write, carrying the entity id so the caller
/// can report errors tagged to the right file/symbol.
pub struct ItemResult<Id> {
    pub id: Id,
    pub result: Result<()>,
}

/// Counts produced by writing one file's owned entities in a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriteCounts {
    pub symbols: usize,
    pub ast_nodes: usize,
}

pub struct RelationalWriter {
    pool: ConnectionPool,
    config: WriterConfig,
}

impl RelationalWriter {
    pub fn new(pool: ConnectionPool, config: WriterConfig) -> Self {
        Self { pool, config }
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
        let mut delay = self.config.base_retry_delay;
        for attempt in 0..=self.config.max_retries {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let classified = classify_sqlite_error(&e);
                    if !classified.retryable() || attempt == self.config.max_retries {
                        return Err(classified);
                    }
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying transient store error");
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
        unreachable!("loop always returns")
    }

    /// Repository upsert (spec §4.3 step 1): a single row, idempotent on
    /// `name`.
    pub fn upsert_repository(&self, repo: &Repository) -> Result<()> {
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            conn.execute(
                "INSERT INTO repositories (repo_id, name, url, branch, commit_hash, metadata_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(name) DO UPDATE SET
                    url = excluded.url,
                    branch = excluded.branch,
                    commit_hash = excluded.commit_hash,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at",
                params![
                    repo.repo_id.to_string(),
                    repo.name,
                    repo.url,
                    repo.branch,
                    repo.commit_hash,
                    serde_json::to_string(&repo.metadata).unwrap_or_else(|_| "{}".into()),
                    repo.created_at.to_rfc3339(),
                    repo.updated_at.to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    /// Write one file's owned entities inside a single transaction (spec
    /// §4.3 "Order of operations", step 2): file upsert, delete existing
    /// symbols/AST nodes (cascades to their edges), then insert fresh ones.
    pub fn write_file(
        &self,
        file: &File,
        symbols: &[Symbol],
        ast_nodes: &[AstNode],
    ) -> Result<FileWriteCounts> {
        let mut conn = self.pool.acquire()?;
        self.with_retry(|| {
            let tx = conn.transaction()?;
            upsert_file_row(&tx, file)?;
            delete_file_children(&tx, file.file_id)?;
            insert_symbols_batch(&tx, symbols, self.config.batch_size)?;
            insert_ast_nodes_batch(&tx, ast_nodes, self.config.batch_size)?;
            tx.commit()?;
            Ok(())
        })?;
        Ok(FileWriteCounts {
            symbols: symbols.len(),
            ast_nodes: ast_nodes.len(),
        })
    }

    /// Resolve cross-file edges in a second pass, outside any file's
    /// transaction (spec §4.3 "Cross-file edges are resolved in a second
    /// pass"). Per-edge failure is isolated: one bad row does not fail the
    /// batch.
    pub fn write_edges(&self, edges: &[Edge]) -> Vec<ItemResult<Uuid>> {
        let mut results = Vec::with_capacity(edges.len());
        for chunk in edges.chunks(self.config.batch_size.max(1)) {
            let conn = match self.pool.acquire() {
                Ok(c) => c,
                Err(e) => {
                    for edge in chunk {
                        results.push(ItemResult {
                            id: edge.edge_id,
                            result: Err(StoreError::Transient(e.to_string())),
                        });
                    }
                    continue;
                }
            };
            for edge in chunk {
                let outcome = self.with_retry(|| insert_edge_row(&conn, edge));
                results.push(ItemResult {
                    id: edge.edge_id,
                    result: outcome,
                });
            }
        }
        results
    }

    /// Load `(path, checksum)` for every currently stored file of a
    /// repository, feeding the Change Detector (C2).
    pub fn load_file_checksums(&self, repo_id: Uuid) -> Result<HashMap<String, String>> {
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            let mut stmt =
                conn.prepare("SELECT path, checksum FROM files WHERE repo_id = ?1")?;
            let rows = stmt
                .query_map(params![repo_id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows.into_iter().collect())
        })
    }

    /// Load `(path, file_id)` for every currently stored file of a
    /// repository, so a re-submitted bundle that omits stable `file_id`s
    /// reuses the existing primary key instead of minting a new one on
    /// every run (which would orphan the previous row's children).
    pub fn load_file_ids(&self, repo_id: Uuid) -> Result<HashMap<String, Uuid>> {
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            let mut stmt = conn.prepare("SELECT path, file_id FROM files WHERE repo_id = ?1")?;
            let rows = stmt
                .query_map(params![repo_id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .map(|rows| {
            rows.into_iter()
                .filter_map(|(path, id)| Uuid::parse_str(&id).ok().map(|id| (path, id)))
                .collect()
        })
    }

    /// Resolve a repository's stored `repo_id` by name, if it already
    /// exists (spec §4.2 edge case: a never-before-seen repo has no stored
    /// state at all).
    pub fn find_repo_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            conn.query_row(
                "SELECT repo_id FROM repositories WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .map(|opt| opt.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Load every symbol id owned by the given file ids. Callers purging a
    /// deleted file's graph nodes must read this *before* `delete_files`
    /// runs, since the cascade removes the rows this query reads.
    pub fn load_symbol_ids_for_files(&self, file_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            let placeholders = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("SELECT symbol_id FROM symbols WHERE file_id IN ({placeholders})");
            let ids: Vec<String> = file_ids.iter().map(|id| id.to_string()).collect();
            let params: Vec<&dyn rusqlite::ToSql> =
                ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .map(|rows| rows.into_iter().filter_map(|s| Uuid::parse_str(&s).ok()).collect())
    }

    /// Delete files (and, via cascade, their symbols/AST nodes/edges) that
    /// no longer appear in the incoming bundle (spec §4.2 `deleted` set).
    pub fn delete_files(&self, repo_id: Uuid, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let conn = self.pool.acquire()?;
        self.with_retry(|| {
            for path in paths {
                conn.execute(
                    "DELETE FROM files WHERE repo_id = ?1 AND path = ?2",
                    params![repo_id.to_string(), path],
                )?;
            }
            Ok(())
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

fn upsert_file_row(conn: &Connection, file: &File) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO files (file_id, repo_id, path, language, size, checksum, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(repo_id, path) DO UPDATE SET
            file_id = excluded.file_id,
            language = excluded.language,
            size = excluded.size,
            checksum = excluded.checksum,
            updated_at = excluded.updated_at",
        params![
            file.file_id.to_string(),
            file.repo_id.to_string(),
            file.path,
            file.language,
            file.size as i64,
            file.checksum,
            file.created_at.to_rfc3339(),
            file.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn delete_file_children(conn: &Connection, file_id: Uuid) -> rusqlite::Result<()> {
    // Deletes symbols (cascades their edges) and AST nodes owned by the
    // file. Required because a modified file may have lost symbols.
    conn.execute(
        "DELETE FROM symbols WHERE file_id = ?1",
        params![file_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM ast_nodes WHERE file_id = ?1",
        params![file_id.to_string()],
    )?;
    Ok(())
}

fn insert_symbols_batch(conn: &Connection, symbols: &[Symbol], batch_size: usize) -> rusqlite::Result<()> {
    for chunk in symbols.chunks(batch_size.max(1)) {
        if chunk.is_empty() {
            continue;
        }
        let mut sql = String::from(
            "INSERT INTO symbols (symbol_id, file_id, name, kind, signature, start_line, end_line, start_byte, end_byte, docstring, semantic_summary) VALUES ",
        );
        let mut placeholders = Vec::with_capacity(chunk.len());
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(chunk.len() * 11);
        for sym in chunk {
            placeholders.push("(?,?,?,?,?,?,?,?,?,?,?)");
            values.push(Box::new(sym.symbol_id.to_string()));
            values.push(Box::new(sym.file_id.to_string()));
            values.push(Box::new(sym.name.clone()));
            values.push(Box::new(sym.kind.as_str().to_string()));
            values.push(Box::new(sym.signature.clone()));
            values.push(Box::new(sym.start_line));
            values.push(Box::new(sym.end_line));
            values.push(Box::new(sym.start_byte));
            values.push(Box::new(sym.end_byte));
            values.push(Box::new(sym.docstring.clone()));
            values.push(Box::new(sym.semantic_summary.clone()));
        }
        sql.push_str(&placeholders.join(","));
        sql.push_str(
            " ON CONFLICT(file_id, name, start_line, start_byte) DO UPDATE SET
                signature = excluded.signature,
                kind = excluded.kind,
                end_line = excluded.end_line,
                end_byte = excluded.end_byte,
                docstring = excluded.docstring,
                semantic_summary = excluded.semantic_summary",
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
        conn.execute(&sql, param_refs.as_slice())?;
    }
    Ok(())
}

fn insert_ast_nodes_batch(conn: &Connection, nodes: &[AstNode], batch_size: usize) -> rusqlite::Result<()> {
    for chunk in nodes.chunks(batch_size.max(1)) {
        if chunk.is_empty() {
            continue;
        }
        let mut sql = String::from(
            "INSERT INTO ast_nodes (node_id, file_id, node_type, parent_id, start_line, end_line, start_byte, end_byte, text, attributes_json) VALUES ",
        );
        let mut placeholders = Vec::with_capacity(chunk.len());
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(chunk.len() * 10);
        for node in chunk {
            placeholders.push("(?,?,?,?,?,?,?,?,?,?)");
            values.push(Box::new(node.node_id.to_string()));
            values.push(Box::new(node.file_id.to_string()));
            values.push(Box::new(node.node_type.clone()));
            values.push(Box::new(node.parent_id.map(|p| p.to_string())));
            values.push(Box::new(node.start_line));
            values.push(Box::new(node.end_line));
            values.push(Box::new(node.start_byte));
            values.push(Box::new(node.end_byte));
            values.push(Box::new(node.text.clone()));
            values.push(Box::new(
                serde_json::to_string(&node.attributes).unwrap_or_else(|_| "{}".into()),
            ));
        }
        sql.push_str(&placeholders.join(","));
        sql.push_str(" ON CONFLICT(node_id) DO NOTHING");
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
        conn.execute(&sql, param_refs.as_slice())?;
    }
    Ok(())
}

fn insert_edge_row(conn: &Connection, edge: &Edge) -> rusqlite::Result<()> {
    debug!(edge_id = %edge.edge_id, "writing edge");
    conn.execute(
        "INSERT INTO edges (edge_id, source_id, target_id, edge_type, source_file, target_file, target_module, line_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(edge_id) DO UPDATE SET
            target_id = excluded.target_id,
            edge_type = excluded.edge_type,
            target_file = excluded.target_file,
            target_module = excluded.target_module,
            line_number = excluded.line_number",
        params![
            edge.edge_id.to_string(),
            edge.source_id.to_string(),
            edge.target_id.map(|t| t.to_string()),
            edge.edge_type.as_str(),
            edge.source_file,
            edge.target_file,
            edge.target_module,
            edge.line_number,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codeatlas_core::SymbolKind;

    fn writer() -> RelationalWriter {
        RelationalWriter::new(ConnectionPool::open_in_memory().unwrap(), WriterConfig::default())
    }

    fn repo() -> Repository {
        Repository {
            repo_id: Uuid::new_v4(),
            name: "r1".into(),
            url: None,
            branch: "main".into(),
            commit_hash: None,
            metadata: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repository_upsert_is_idempotent_on_name() {
        let w = writer();
        let mut repo = repo();
        w.upsert_repository(&repo).unwrap();
        let first_id = repo.repo_id;

        // Re-submitting the same name updates in place rather than
        // inserting a second row.
        repo.branch = "develop".into();
        w.upsert_repository(&repo).unwrap();

        let found = w.find_repo_id_by_name("r1").unwrap().unwrap();
        assert_eq!(found, first_id);
    }

    #[test]
    fn write_file_then_reload_checksums() {
        let w = writer();
        let repo = repo();
        w.upsert_repository(&repo).unwrap();

        let file = File {
            file_id: Uuid::new_v4(),
            repo_id: repo.repo_id,
            path: "a.go".into(),
            language: "go".into(),
            size: 10,
            checksum: "H1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let symbol = Symbol {
            symbol_id: Uuid::new_v4(),
            file_id: file.file_id,
            name: "f".into(),
            kind: SymbolKind::Function,
            signature: None,
            start_line: 1,
            end_line: 2,
            start_byte: 0,
            end_byte: 10,
            docstring: None,
            semantic_summary: None,
        };

        let counts = w.write_file(&file, &[symbol], &[]).unwrap();
        assert_eq!(counts.symbols, 1);

        let checksums = w.load_file_checksums(repo.repo_id).unwrap();
        assert_eq!(checksums.get("a.go"), Some(&"H1".to_string()));
    }

    #[test]
    fn reindexing_modified_file_drops_stale_symbols() {
        let w = writer();
        let repo = repo();
        w.upsert_repository(&repo).unwrap();

        let file_id = Uuid::new_v4();
        let file = File {
            file_id,
            repo_id: repo.repo_id,
            path: "a.go".into(),
            language: "go".into(),
            size: 10,
            checksum: "H1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let old_symbol = Symbol {
            symbol_id: Uuid::new_v4(),
            file_id,
            name: "old_fn".into(),
            kind: SymbolKind::Function,
            signature: None,
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 1,
            docstring: None,
            semantic_summary: None,
        };
        w.write_file(&file, &[old_symbol], &[]).unwrap();

        // Re-index with a different checksum and no symbols: old_fn must
        // disappear, not linger.
        let mut modified_file = file.clone();
        modified_file.checksum = "H2".into();
        w.write_file(&modified_file, &[], &[]).unwrap();

        let conn = w.pool().acquire().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM symbols WHERE file_id = ?1", params![file_id.to_string()], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn load_file_ids_reflects_stored_primary_keys() {
        let w = writer();
        let repo = repo();
        w.upsert_repository(&repo).unwrap();

        let file_id = Uuid::new_v4();
        let file = File {
            file_id,
            repo_id: repo.repo_id,
            path: "a.go".into(),
            language: "go".into(),
            size: 10,
            checksum: "H1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        w.write_file(&file, &[], &[]).unwrap();

        let ids = w.load_file_ids(repo.repo_id).unwrap();
        assert_eq!(ids.get("a.go"), Some(&file_id));
    }

    #[test]
    fn load_symbol_ids_for_files_reads_before_cascade_deletes_them() {
        let w = writer();
        let repo = repo();
        w.upsert_repository(&repo).unwrap();

        let file_id = Uuid::new_v4();
        let file = File {
            file_id,
            repo_id: repo.repo_id,
            path: "a.go".into(),
            language: "go".into(),
            size: 10,
            checksum: "H1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let symbol_id = Uuid::new_v4();
        let symbol = Symbol {
            symbol_id,
            file_id,
            name: "foo".into(),
            kind: SymbolKind::Function,
            signature: None,
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 1,
            docstring: None,
            semantic_summary: None,
        };
        w.write_file(&file, &[symbol], &[]).unwrap();

        let ids = w.load_symbol_ids_for_files(&[file_id]).unwrap();
        assert_eq!(ids, vec![symbol_id]);

        w.delete_files(repo.repo_id, &["a.go".to_string()]).unwrap();
        let ids_after_delete = w.load_symbol_ids_for_files(&[file_id]).unwrap();
        assert!(ids_after_delete.is_empty());
    }

    #[test]
    fn delete_files_cascades_symbols() {
        let w = writer();
        let repo = repo();
        w.upsert_repository(&repo).unwrap();

        let file_id = Uuid::new_v4();
        let file = File {
            file_id,
            repo_id: repo.repo_id,
            path: "a.go".into(),
            language: "go".into(),
            size: 10,
            checksum: "H1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        w.write_file(&file, &[], &[]).unwrap();
        w.delete_files(repo.repo_id, &["a.go".to_string()]).unwrap();

        let checksums = w.load_file_checksums(repo.repo_id).unwrap();
        assert!(checksums.is_empty());
    }

    #[test]
    fn edge_with_unresolvable_source_is_reported_not_panicked() {
        let w = writer();
        let edge = Edge {
            edge_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(), // no matching symbol row exists
            target_id: None,
            edge_type: codeatlas_core::EdgeType::Calls,
            source_file: "a.go".into(),
            target_file: None,
            target_module: Some("external/x".into()),
            line_number: None,
        };
        let results = w.write_edges(&[edge]);
        assert_eq!(results.len(), 1);
        assert!(results[0].result.is_err());
        assert!(!results[0].result.as_ref().unwrap_err().retryable());
    }
}
