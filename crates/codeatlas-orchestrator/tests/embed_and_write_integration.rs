//! End-to-end coverage of the C7 embedding phase: a real `Orchestrator`
//! driving an in-memory relational store, the real in-process graph
//! projection, a real `EmbedderClient` pointed at a mocked HTTP backend
//! (the same way the teacher's `azure_ml`/`openai` embedding clients are
//! exercised against `wiremock`), and a fake `VectorSink` recording what
//! would have reached Qdrant.
//!
//! This is the path the orchestrator's own inline tests never exercise:
//! every inline test there runs with `skip_vectors: true`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;
use wiremock::matchers::{body_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use codeatlas_core::{
    BundleFile, BundleSymbol, IndexOptions, IndexRequestBundle, ParseMetadata, ParseOutput, Vector,
};
use codeatlas_embed::{EmbedRequest, EmbedderBackend, EmbedderClient, EmbedderConfig};
use codeatlas_orchestrator::{IndexRequest, IndexStatus, Orchestrator, OrchestratorConfig};
use codeatlas_store::{ConnectionPool, RelationalWriter, WriterConfig};
use codeatlas_vector::{Result as VectorResult, VectorSink, WriteOutcome};

const DIMENSIONS: usize = 4;
const MODEL: &str = "embed-model-v1";

/// Records every point written or deleted instead of talking to Qdrant.
#[derive(Default)]
struct FakeVectorStore {
    points: Mutex<HashMap<Uuid, Vector>>,
}

#[async_trait::async_trait]
impl VectorSink for FakeVectorStore {
    async fn write(&self, _repo_id: Uuid, vector: &Vector) -> VectorResult<WriteOutcome> {
        self.points.lock().insert(vector.vector_id, vector.clone());
        Ok(WriteOutcome::Written)
    }

    async fn delete_points(&self, point_ids: &[Uuid]) -> VectorResult<()> {
        let mut points = self.points.lock();
        for id in point_ids {
            points.remove(id);
        }
        Ok(())
    }
}

fn orchestrator_with(
    vector: Arc<FakeVectorStore>,
    embedder: EmbedderClient,
) -> Orchestrator {
    let store = Arc::new(RelationalWriter::new(
        ConnectionPool::open_in_memory().unwrap(),
        WriterConfig::default(),
    ));
    Orchestrator::new(
        store,
        Some(vector as Arc<dyn VectorSink>),
        Some(Arc::new(embedder)),
        OrchestratorConfig::default(),
    )
}

fn symbol(id: Uuid, name: &str, signature: Option<&str>, docstring: Option<&str>) -> BundleSymbol {
    BundleSymbol {
        symbol_id: Some(id),
        file_id: None,
        name: name.to_string(),
        kind: "function".to_string(),
        signature: signature.map(str::to_string),
        start_line: 1,
        end_line: 5,
        start_byte: 0,
        end_byte: 50,
        docstring: docstring.map(str::to_string),
        semantic_summary: None,
    }
}

fn bundle(repo_name: &str, symbols: Vec<BundleSymbol>) -> IndexRequestBundle {
    IndexRequestBundle {
        repo_id: None,
        repo_name: repo_name.to_string(),
        repo_url: None,
        branch: "main".to_string(),
        commit_hash: None,
        parse_output: ParseOutput {
            files: vec![BundleFile {
                file_id: None,
                path: "a.go".to_string(),
                language: "go".to_string(),
                size: 100,
                checksum: "H1".to_string(),
                symbols,
                ast_nodes: vec![],
            }],
            relationships: vec![],
            metadata: ParseMetadata::default(),
        },
        options: IndexOptions {
            incremental: false,
            skip_vectors: false,
            batch_size: None,
            worker_count: None,
            embedding_model: None,
        },
    }
}

fn embedding_response(dims: usize) -> serde_json::Value {
    serde_json::json!({ "data": [{ "embedding": vec![0.1f32; dims] }] })
}

fn request_for(text: &str) -> EmbedRequest {
    EmbedRequest {
        model: MODEL.to_string(),
        input: vec![text.to_string()],
    }
}

#[tokio::test]
async fn embeds_every_symbol_including_one_with_no_docstring_or_signature() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_json(&request_for("fn alpha()")))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(DIMENSIONS)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_json(&request_for("docs for beta")))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(DIMENSIONS)))
        .mount(&server)
        .await;
    // gamma has neither a docstring nor a signature: embed_and_write must
    // fall back to its name rather than skip it.
    Mock::given(method("POST"))
        .and(body_json(&request_for("gamma")))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(DIMENSIONS)))
        .mount(&server)
        .await;

    let config = EmbedderConfig::new(EmbedderBackend::Local, server.uri(), MODEL, DIMENSIONS);
    let embedder = EmbedderClient::new(config).unwrap();
    let vector = Arc::new(FakeVectorStore::default());
    let orch = orchestrator_with(vector.clone(), embedder);

    let b = bundle(
        "repo-embed-happy",
        vec![
            symbol(Uuid::new_v4(), "alpha", Some("fn alpha()"), None),
            symbol(Uuid::new_v4(), "beta", Some("fn beta()"), Some("docs for beta")),
            symbol(Uuid::new_v4(), "gamma", None, None),
        ],
    );

    let result = orch.index(IndexRequest::new(b)).await;

    assert_eq!(result.status, IndexStatus::Success);
    assert_eq!(result.vectors_created, 3);
    assert_eq!(vector.points.lock().len(), 3);
}

#[tokio::test]
async fn dimension_mismatch_aborts_the_phase_and_rolls_back_vectors_already_written() {
    let server = MockServer::start().await;

    // alpha embeds cleanly first...
    Mock::given(method("POST"))
        .and(body_json(&request_for("fn alpha()")))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(DIMENSIONS)))
        .mount(&server)
        .await;
    // ...beta comes back with the wrong number of dimensions, which must
    // abort the whole phase and undo alpha's write.
    Mock::given(method("POST"))
        .and(body_json(&request_for("fn beta()")))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(DIMENSIONS - 1)))
        .mount(&server)
        .await;

    let config = EmbedderConfig::new(EmbedderBackend::Local, server.uri(), MODEL, DIMENSIONS);
    let embedder = EmbedderClient::new(config).unwrap();
    let vector = Arc::new(FakeVectorStore::default());
    let orch = orchestrator_with(vector.clone(), embedder);

    let b = bundle(
        "repo-embed-mismatch",
        vec![
            symbol(Uuid::new_v4(), "alpha", Some("fn alpha()"), None),
            symbol(Uuid::new_v4(), "beta", Some("fn beta()"), None),
        ],
    );

    let result = orch.index(IndexRequest::new(b)).await;

    assert_eq!(result.status, IndexStatus::Partial);
    assert_eq!(result.vectors_created, 0);
    assert!(vector.points.lock().is_empty(), "aborted phase must leave no vectors behind");
    assert!(result.errors.iter().any(|e| e.error_type == "EmbedderDimensionMismatch"));
}
