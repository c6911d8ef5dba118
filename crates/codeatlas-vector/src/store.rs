//! Vector writer (C6): upserts embeddings keyed by entity identity,
//! deduplicating per `(entity_id, entity_type, chunk_index)`.

use crate::error::{Result, VectorError};
use codeatlas_core::{EntityType, Vector};
use qdrant_client::qdrant::{
    vectors_config::Config, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, GetPointsBuilder, PointId, PointStruct, UpsertPointsBuilder, VectorParams,
    VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// Namespace for deterministic point-id derivation; fixed so the same
/// `(entity_id, entity_type, chunk_index)` always maps to the same point,
/// making re-submission idempotent without a read-before-write.
const POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0xca, 0x7e, 0xa1, 0x45, 0xb0, 0x0c, 0x40, 0xde, 0x9f, 0x31, 0x6a, 0x99, 0xc0, 0xde, 0xa7, 0x1a,
]);

pub const REPO_ID_FIELD: &str = "repo_id";

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub dimensions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    SkippedUnchanged,
}

pub struct VectorWriter {
    client: Qdrant,
    collection: String,
}

/// The write surface the orchestrator's embedding phase depends on,
/// separated from `VectorWriter` so tests can substitute an in-memory
/// recorder instead of a live Qdrant connection (qdrant-client speaks gRPC,
/// not HTTP, so it has no wiremock-style seam the way `codeatlas-embed`'s
/// client does).
#[async_trait::async_trait]
pub trait VectorSink: Send + Sync {
    async fn write(&self, repo_id: Uuid, vector: &Vector) -> Result<WriteOutcome>;
    async fn delete_points(&self, point_ids: &[Uuid]) -> Result<()>;
}

#[async_trait::async_trait]
impl VectorSink for VectorWriter {
    async fn write(&self, repo_id: Uuid, vector: &Vector) -> Result<WriteOutcome> {
        VectorWriter::write(self, repo_id, vector).await
    }

    async fn delete_points(&self, point_ids: &[Uuid]) -> Result<()> {
        VectorWriter::delete_points(self, point_ids).await
    }
}

impl VectorWriter {
    pub async fn connect(config: VectorStoreConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = config.api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorError::Permanent(format!("failed to build qdrant client: {e}")))?;

        let writer = Self {
            client,
            collection: config.collection,
        };
        writer.ensure_collection(config.dimensions).await?;
        Ok(writer)
    }

    async fn ensure_collection(&self, dimensions: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(VectorError::from)?;
        if exists {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        info!(collection = %self.collection, dimensions, "creating vector collection");
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: dimensions,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };
        self.client
            .create_collection(CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config))
            .await
            .map_err(VectorError::from)?;
        Ok(())
    }

    /// Deterministic point id for `(entity_id, entity_type, chunk_index)`
    /// (spec §4.6): the same triple always maps to the same point.
    pub fn point_id(entity_id: Uuid, entity_type: EntityType, chunk_index: u32) -> Uuid {
        let name = format!("{entity_id}:{}:{chunk_index}", entity_type.as_str());
        Uuid::new_v5(&POINT_NAMESPACE, name.as_bytes())
    }

    /// `write(entity_id, entity_type, content, embedding, model, chunk_index)`
    /// (spec §4.6 contract). Skips the upsert if an identical
    /// `(entity_id, entity_type, chunk_index, model)` point already exists
    /// with matching content.
    pub async fn write(&self, repo_id: Uuid, vector: &Vector) -> Result<WriteOutcome> {
        let point_id = Self::point_id(vector.entity_id, vector.entity_type, vector.chunk_index);

        if self.unchanged(point_id, vector).await? {
            return Ok(WriteOutcome::SkippedUnchanged);
        }

        let payload = Payload::try_from(json!({
            REPO_ID_FIELD: repo_id.to_string(),
            "entity_id": vector.entity_id.to_string(),
            "entity_type": vector.entity_type.as_str(),
            "content": vector.content,
            "model": vector.model,
            "chunk_index": vector.chunk_index,
        }))
        .map_err(|e| VectorError::Permanent(format!("payload build failed: {e}")))?;

        let point = PointStruct::new(
            PointId::from(point_id.to_string()),
            vector.embedding.clone(),
            payload,
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(VectorError::from)?;

        Ok(WriteOutcome::Written)
    }

    async fn unchanged(&self, point_id: Uuid, vector: &Vector) -> Result<bool> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(
                &self.collection,
                vec![PointId::from(point_id.to_string())],
            ))
            .await
            .map_err(VectorError::from)?;

        let Some(existing) = response.result.into_iter().next() else {
            return Ok(false);
        };

        let stored_content = existing
            .payload
            .get("content")
            .and_then(|v| v.as_str().map(|s| s.to_string()));
        let stored_model = existing
            .payload
            .get("model")
            .and_then(|v| v.as_str().map(|s| s.to_string()));

        Ok(stored_content.as_deref() == Some(vector.content.as_str())
            && stored_model.as_deref() == Some(vector.model.as_str()))
    }

    /// Deletes specific points by id. Used to roll back the vectors
    /// written earlier in a call whose embedding phase later aborted (e.g.
    /// a dimension mismatch partway through a batch), so that phase stays
    /// all-or-nothing rather than leaving a partial set of rows behind.
    pub async fn delete_points(&self, point_ids: &[Uuid]) -> Result<()> {
        if point_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<PointId> = point_ids.iter().map(|id| PointId::from(id.to_string())).collect();
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids).wait(true))
            .await
            .map_err(VectorError::from)?;
        Ok(())
    }

    /// Deletes every point belonging to a repository. Used both for full
    /// repo teardown and to rewrite vectors when the embedding model
    /// changes across runs (spec §9 Open Questions).
    pub async fn delete_repo_vectors(&self, repo_id: Uuid) -> Result<()> {
        let filter = Filter::must([Condition::matches(REPO_ID_FIELD, repo_id.to_string())]);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(VectorError::from)?;
        Ok(())
    }
}
