//! The Orchestrator (C7): coordinates validation, change detection,
//! relational writes, graph projection, and embedding for one `index()`
//! call, the way the teacher's `IncrementalUpdater::update_repository`
//! coordinates Merkle diffing, reparsing, and graph merge — generalized
//! here to an async, multi-file worker pool writing to three stores
//! instead of one in-process mutation.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use codeatlas_core::{diff_files, validate, BundleFile, EntityType, IndexMode, PetCodeGraph, Vector};
use codeatlas_embed::EmbedderClient;
use codeatlas_store::RelationalWriter;
use codeatlas_vector::{VectorSink, VectorWriter};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accumulator::ResultAccumulator;
use crate::convert;
use crate::error::OrchestratorError;
use crate::locks::RepoLockTable;
use crate::progress::{Phase, ProgressEvent};
use crate::request::IndexRequest;
use crate::response::{IndexResult, IndexStatus};

/// Tunables the orchestrator itself owns (spec §6.5 indexer section, minus
/// the config-file plumbing which lives in `codeatlas-config`).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub worker_count: usize,
    pub max_ast_nodes_per_file: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_count: 4,
            max_ast_nodes_per_file: 5_000,
        }
    }
}

/// One indexed file's converted entities, ready for the write stage.
struct FileUnit {
    path: String,
    file: codeatlas_core::File,
    symbols: Vec<codeatlas_core::Symbol>,
    ast_nodes: Vec<codeatlas_core::AstNode>,
}

pub struct Orchestrator {
    store: Arc<RelationalWriter>,
    vector: Option<Arc<dyn VectorSink>>,
    embedder: Option<Arc<EmbedderClient>>,
    locks: RepoLockTable,
    /// Per-repo graph projection, held for the process lifetime: the
    /// property-graph store is in-process (spec §2 "co-located stores"),
    /// so there is no separate persistence step to load it from.
    graphs: DashMap<Uuid, Arc<SyncMutex<PetCodeGraph>>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<RelationalWriter>,
        vector: Option<Arc<dyn VectorSink>>,
        embedder: Option<Arc<EmbedderClient>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            vector,
            embedder,
            locks: RepoLockTable::new(),
            graphs: DashMap::new(),
            config,
        }
    }

    fn graph_for(&self, repo_id: Uuid) -> Arc<SyncMutex<PetCodeGraph>> {
        self.graphs
            .entry(repo_id)
            .or_insert_with(|| Arc::new(SyncMutex::new(PetCodeGraph::new())))
            .clone()
    }

    /// Snapshot of the in-process graph projection for a repository:
    /// `(node_count, relationship_count, pending_unresolved_count)`.
    pub fn graph_stats(&self, repo_id: Uuid) -> (usize, usize, usize) {
        match self.graphs.get(&repo_id) {
            Some(graph) => {
                let graph = graph.lock();
                (graph.node_count(), graph.relationship_count(), graph.pending_unresolved_count())
            }
            None => (0, 0, 0),
        }
    }

    /// Run one indexing pass for `request.bundle` (spec §4.7 contract: a
    /// single INIT -> ... -> DONE state machine per call, serialized with
    /// any other call for the same repo name).
    pub async fn index(&self, request: IndexRequest) -> IndexResult {
        let start = Instant::now();
        let _guard = self.locks.acquire(&request.bundle.repo_name).await;
        let accumulator = ResultAccumulator::new();
        let total_files = request.bundle.parse_output.files.len() as u64;

        self.emit(&request, Phase::Validating, 0, total_files, start);

        if let Err(failure) = validate(&request.bundle) {
            for v in &failure.violations {
                accumulator.push_error(
                    &OrchestratorError::Validation(format!("{}: {}", v.field_path, v.constraint)),
                    None,
                );
            }
            return self.finish(Uuid::nil(), IndexStatus::Failed, accumulator, start);
        }

        if request.cancellation.is_cancelled() {
            accumulator.push_error(&OrchestratorError::Cancelled, None);
            return self.finish(Uuid::nil(), IndexStatus::Failed, accumulator, start);
        }

        let repo_id = match self.resolve_repo_id(&request).await {
            Ok(id) => id,
            Err(e) => {
                accumulator.push_error(&e, None);
                return self.finish(Uuid::nil(), IndexStatus::Failed, accumulator, start);
            }
        };

        if let Err(e) = self.upsert_repository(repo_id, &request).await {
            accumulator.push_error(&e, None);
            return self.finish(repo_id, IndexStatus::Failed, accumulator, start);
        }

        self.emit(&request, Phase::Diffing, 0, total_files, start);

        let existing_checksums = match self.load_checksums(repo_id).await {
            Ok(c) => c,
            Err(e) => {
                accumulator.push_error(&e, None);
                return self.finish(repo_id, IndexStatus::Failed, accumulator, start);
            }
        };
        let existing_file_ids = match self.load_file_ids(repo_id).await {
            Ok(c) => c,
            Err(e) => {
                accumulator.push_error(&e, None);
                return self.finish(repo_id, IndexStatus::Failed, accumulator, start);
            }
        };

        let incoming: Vec<(String, String)> = request
            .bundle
            .parse_output
            .files
            .iter()
            .map(|f| (f.path.clone(), f.checksum.clone()))
            .collect();
        let mode = if request.bundle.options.incremental {
            IndexMode::Incremental
        } else {
            IndexMode::Full
        };
        let change_set = diff_files(&existing_checksums, &incoming, mode);

        if !change_set.deleted.is_empty() {
            let deleted_file_ids: Vec<Uuid> = change_set
                .deleted
                .iter()
                .filter_map(|path| existing_file_ids.get(path).copied())
                .collect();
            // Must read before `delete_files`: the cascade removes these
            // rows, and the graph is keyed by symbol_id, not file_id.
            let symbol_ids_to_remove = match self.load_symbol_ids_for_files(&deleted_file_ids).await {
                Ok(ids) => ids,
                Err(e) => {
                    accumulator.push_error(&e, None);
                    Vec::new()
                }
            };
            if let Err(e) = self.delete_files(repo_id, &change_set.deleted).await {
                accumulator.push_error(&e, None);
            }
            let graph = self.graph_for(repo_id);
            let mut graph = graph.lock();
            for symbol_id in symbol_ids_to_remove {
                graph.remove_node(symbol_id);
            }
        }

        let to_write: std::collections::HashSet<&str> = change_set.to_write().collect();
        let files_to_process: Vec<&BundleFile> = request
            .bundle
            .parse_output
            .files
            .iter()
            .filter(|f| to_write.contains(f.path.as_str()))
            .collect();

        self.emit(&request, Phase::Writing, 0, files_to_process.len() as u64, start);

        let units: Vec<FileUnit> = files_to_process
            .iter()
            .map(|bundle_file| {
                let file_id = convert::resolve_file_id(bundle_file, &existing_file_ids);
                let (ast_nodes, dropped) =
                    convert::to_ast_nodes(&bundle_file.ast_nodes, file_id, self.config.max_ast_nodes_per_file);
                if dropped > 0 {
                    warn!(path = %bundle_file.path, dropped, "ast node cap exceeded, dropping overflow");
                }
                FileUnit {
                    path: bundle_file.path.clone(),
                    file: convert::to_file(bundle_file, file_id, repo_id, chrono::Utc::now()),
                    symbols: convert::to_symbols(&bundle_file.symbols, file_id),
                    ast_nodes,
                }
            })
            .collect();

        if request.cancellation.is_cancelled() {
            accumulator.push_error(&OrchestratorError::Cancelled, None);
            return self.finish(repo_id, IndexStatus::Failed, accumulator, start);
        }

        self.write_files(units, &request, &accumulator).await;

        self.emit(
            &request,
            Phase::ResolvingEdges,
            accumulator.files_processed.load(Ordering::Relaxed),
            files_to_process.len() as u64,
            start,
        );

        // Scoped to files actually being (re)written, the same way symbols
        // are: an edge sourced from an unchanged file was already written
        // on a prior index and resubmitting it here would just re-derive
        // the same edge_id and no-op the upsert, at the cost of load.
        let edges: Vec<codeatlas_core::Edge> = request
            .bundle
            .parse_output
            .relationships
            .iter()
            .filter(|e| to_write.contains(e.source_file.as_str()))
            .map(convert::to_edge)
            .collect();
        let edge_results = {
            let store = self.store.clone();
            let edges_for_write = edges.clone();
            tokio::task::spawn_blocking(move || store.write_edges(&edges_for_write))
                .await
                .unwrap_or_default()
        };
        for item in &edge_results {
            match &item.result {
                Ok(()) => {
                    accumulator.edges_created.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => accumulator.push_error(&OrchestratorError::from(e.clone()), None),
            }
        }

        self.emit(
            &request,
            Phase::ProjectingGraph,
            accumulator.files_processed.load(Ordering::Relaxed),
            files_to_process.len() as u64,
            start,
        );

        {
            let graph = self.graph_for(repo_id);
            let mut graph = graph.lock();
            let all_symbols: Vec<codeatlas_core::Symbol> = files_to_process
                .iter()
                .flat_map(|bundle_file| {
                    let file_id = convert::resolve_file_id(bundle_file, &existing_file_ids);
                    convert::to_symbols(&bundle_file.symbols, file_id)
                })
                .collect();
            graph.project(&all_symbols, &edges);
            let resolved = graph.resolve_pending();
            if resolved > 0 {
                info!(resolved, "resolved previously pending edges");
            }
        }

        if !request.bundle.options.skip_vectors {
            self.emit(
                &request,
                Phase::Embedding,
                accumulator.files_processed.load(Ordering::Relaxed),
                files_to_process.len() as u64,
                start,
            );
            self.embed_and_write(repo_id, &files_to_process, &request, &accumulator).await;
        }

        self.emit(
            &request,
            Phase::Done,
            accumulator.files_processed.load(Ordering::Relaxed),
            files_to_process.len() as u64,
            start,
        );

        // Overall status is the union of outcomes across both the
        // relational-write phase and the embedding phase: a clean write
        // pass with a failed embedding phase (e.g. a dimension mismatch)
        // must still downgrade away from `Success`.
        let files_failed = accumulator.files_failed.load(Ordering::Relaxed);
        let files_succeeded = accumulator.files_succeeded.load(Ordering::Relaxed);
        let embedding_errors = accumulator.embedding_error_count();

        let status = if files_failed == 0 && embedding_errors == 0 {
            IndexStatus::Success
        } else if files_succeeded > 0 || (files_failed == 0 && embedding_errors > 0) {
            IndexStatus::Partial
        } else {
            IndexStatus::Failed
        };

        self.finish(repo_id, status, accumulator, start)
    }

    fn emit(&self, request: &IndexRequest, phase: Phase, processed: u64, total: u64, start: Instant) {
        request.progress.on_progress(ProgressEvent {
            phase,
            files_processed: processed,
            files_total: total,
            elapsed: start.elapsed(),
        });
    }

    async fn resolve_repo_id(&self, request: &IndexRequest) -> Result<Uuid, OrchestratorError> {
        if let Some(id) = request.bundle.repo_id {
            return Ok(id);
        }
        let store = self.store.clone();
        let name = request.bundle.repo_name.clone();
        let found = tokio::task::spawn_blocking(move || store.find_repo_id_by_name(&name))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)?;
        Ok(found.unwrap_or_else(Uuid::new_v4))
    }

    async fn upsert_repository(&self, repo_id: Uuid, request: &IndexRequest) -> Result<(), OrchestratorError> {
        let repo = convert::to_repository(
            repo_id,
            &request.bundle.repo_name,
            request.bundle.repo_url.clone(),
            &request.bundle.branch,
            request.bundle.commit_hash.clone(),
            chrono::Utc::now(),
        );
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.upsert_repository(&repo))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)
    }

    async fn load_checksums(&self, repo_id: Uuid) -> Result<HashMap<String, String>, OrchestratorError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load_file_checksums(repo_id))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)
    }

    async fn load_file_ids(&self, repo_id: Uuid) -> Result<HashMap<String, Uuid>, OrchestratorError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load_file_ids(repo_id))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)
    }

    async fn load_symbol_ids_for_files(&self, file_ids: &[Uuid]) -> Result<Vec<Uuid>, OrchestratorError> {
        let store = self.store.clone();
        let file_ids = file_ids.to_vec();
        tokio::task::spawn_blocking(move || store.load_symbol_ids_for_files(&file_ids))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)
    }

    async fn delete_files(&self, repo_id: Uuid, paths: &[String]) -> Result<(), OrchestratorError> {
        let store = self.store.clone();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || store.delete_files(repo_id, &paths))
            .await
            .map_err(|e| OrchestratorError::PermanentStore(e.to_string()))?
            .map_err(OrchestratorError::from)
    }

    /// Write every file unit's relational rows, bounded to `worker_count`
    /// concurrent blocking tasks at a time (spec §5 "Worker pool").
    async fn write_files(&self, units: Vec<FileUnit>, request: &IndexRequest, acc: &ResultAccumulator) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut joinset: JoinSet<(String, usize, Result<(), OrchestratorError>)> = JoinSet::new();

        for unit in units {
            if request.cancellation.is_cancelled() {
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let store = self.store.clone();
            let path = unit.path.clone();
            let symbol_count = unit.symbols.len();
            joinset.spawn(async move {
                let _permit = permit;
                let outcome = tokio::task::spawn_blocking(move || {
                    store.write_file(&unit.file, &unit.symbols, &unit.ast_nodes)
                })
                .await;
                let result = match outcome {
                    Ok(Ok(_counts)) => Ok(()),
                    Ok(Err(e)) => Err(OrchestratorError::from(e)),
                    Err(join_err) => Err(OrchestratorError::PermanentStore(join_err.to_string())),
                };
                (path, symbol_count, result)
            });
        }

        while let Some(joined) = joinset.join_next().await {
            let Ok((path, symbol_count, result)) = joined else {
                continue;
            };
            match result {
                Ok(()) => acc.record_file_success(symbol_count as u64, 0),
                Err(e) => acc.record_file_failure(&e, path),
            }
        }
    }

    /// Embeds and writes one Vector row per written Symbol (spec.md's "∀
    /// Symbol s written in a successful index with skip_vectors=false:
    /// exactly one Vector row exists" invariant). A dimension mismatch is
    /// fatal for the whole phase: it aborts immediately and rolls back
    /// every point already written in this call, so the phase stays
    /// all-or-nothing rather than leaving a partial set of vectors behind
    /// (spec.md's "status=partial, no Vector rows written" boundary case).
    async fn embed_and_write(
        &self,
        repo_id: Uuid,
        files: &[&BundleFile],
        request: &IndexRequest,
        acc: &ResultAccumulator,
    ) {
        let (Some(embedder), Some(vector)) = (&self.embedder, &self.vector) else {
            return;
        };
        let model = request
            .bundle
            .options
            .embedding_model
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let mut written_point_ids: Vec<Uuid> = Vec::new();
        let mut written_count: u64 = 0;

        for bundle_file in files {
            if request.cancellation.is_cancelled() {
                break;
            }
            for sym in &bundle_file.symbols {
                let text = sym
                    .docstring
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| sym.signature.clone().filter(|s| !s.trim().is_empty()))
                    .unwrap_or_else(|| sym.name.clone());
                let symbol_id = sym.symbol_id.unwrap_or_else(Uuid::new_v4);
                let embeddings = match embedder.embed(vec![text.clone()]).await {
                    Ok(v) => v,
                    Err(e) => {
                        let orch_err = OrchestratorError::from(e);
                        let fatal = orch_err.is_dimension_mismatch();
                        acc.record_embedding_failure(&orch_err, Some(bundle_file.path.clone()));
                        if fatal {
                            if let Err(rollback_err) = vector.delete_points(&written_point_ids).await {
                                warn!(error = %rollback_err, "failed to roll back vectors after dimension mismatch");
                            }
                            return;
                        }
                        continue;
                    }
                };
                let Some(embedding) = embeddings.into_iter().next() else {
                    continue;
                };
                let point_id = VectorWriter::point_id(symbol_id, EntityType::Symbol, 0);
                let vec_record = Vector {
                    vector_id: point_id,
                    entity_id: symbol_id,
                    entity_type: EntityType::Symbol,
                    embedding,
                    content: text,
                    model: model.clone(),
                    chunk_index: 0,
                };
                match vector.write(repo_id, &vec_record).await {
                    Ok(_) => {
                        written_point_ids.push(point_id);
                        written_count += 1;
                    }
                    Err(e) => acc.record_embedding_failure(&OrchestratorError::from(e), Some(bundle_file.path.clone())),
                }
            }
        }

        if written_count > 0 {
            acc.record_vectors(written_count);
        }
    }

    fn finish(&self, repo_id: Uuid, status: IndexStatus, acc: ResultAccumulator, start: Instant) -> IndexResult {
        let (files_processed, symbols_created, edges_created, vectors_created, _succeeded, _failed) = acc.load();
        let total_errors = acc.total_error_count();
        IndexResult {
            repo_id,
            status,
            files_processed,
            symbols_created,
            edges_created,
            vectors_created,
            errors: acc.into_errors(),
            total_errors,
            duration: start.elapsed(),
        }
    }
}
