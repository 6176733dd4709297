use crate::document::DocumentFormat;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use log::{debug, info};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, PointId, PointStruct, PointsIdsList,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParams,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::env;
use uuid::Uuid;

/// Metadata stored alongside every indexed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_ref: String,
    pub format: Option<DocumentFormat>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub byte_length: usize,
}

/// A vector with its payload, as written to a collection
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    /// Chunk text, already truncated for storage
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A stored entry matched by a similarity query
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: Uuid,
    /// Cosine similarity to the query, in [-1, 1]
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Storage backend for vectors searchable by cosine similarity
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors
    fn backend(&self) -> &str;

    /// Create a cosine collection of the given dimension. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Write all points, or fail without reporting partial success
    async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()>;

    /// Return up to `top_k` points ordered by descending similarity.
    /// A missing collection is treated as empty.
    async fn search(&self, collection: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<SearchResult>>;

    /// Delete points by ID; unknown IDs are ignored
    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<()>;

    /// Remove the collection with all of its points; no-op if it does not exist
    async fn clear(&self, collection: &str) -> Result<()>;
}

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables.
    /// Returns `None` when `QDRANT_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let url = env::var("QDRANT_URL").ok().filter(|url| !url.trim().is_empty())?;
        let api_key = env::var("QDRANT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Some(QdrantConfig { url, api_key })
    }
}

const QDRANT_BACKEND: &str = "qdrant";

/// Vector store backed by a Qdrant server
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder.build().map_err(map_err)?;

        Ok(QdrantStore { client })
    }

    /// Check if a collection exists
    pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
        match self.client.collection_info(collection).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(RagError::index_unavailable(
                QDRANT_BACKEND,
                format!("Failed to check collection existence: {}", e),
            )),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        QDRANT_BACKEND
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            debug!("Using existing collection: {}", name);
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(name).vectors_config(VectorParams {
            size: dimension as u64,
            distance: Distance::Cosine.into(),
            ..Default::default()
        });

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                info!("Created collection {} ({} dimensions)", name, dimension);
                Ok(())
            }
            // Another indexing call created it between the check and the create
            Err(e) if is_already_exists(&e) => {
                debug!("Collection {} was created concurrently", name);
                Ok(())
            }
            Err(e) => Err(RagError::index_unavailable(
                QDRANT_BACKEND,
                format!("Failed to create collection {}: {}", name, e),
            )),
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points = points
            .into_iter()
            .map(|point| {
                let payload = Payload::try_from(json!({
                    "text": point.text,
                    "document_ref": point.metadata.document_ref,
                    "format": point.metadata.format.map(|f| f.as_str()),
                    "chunk_index": point.metadata.chunk_index,
                    "total_chunks": point.metadata.total_chunks,
                    "byte_length": point.metadata.byte_length,
                }))
                .map_err(map_err)?;

                Ok(PointStruct::new(point.id.to_string(), point.vector, payload))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| {
                RagError::index_unavailable(
                    QDRANT_BACKEND,
                    format!("Failed to upsert points in collection {}: {}", collection, e),
                )
            })?;

        debug!("Upserted {} points into {}", count, collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let search_request =
            SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64).with_payload(true);

        let search_response = match self.client.search_points(search_request).await {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => {
                debug!("Collection {} does not exist yet", collection);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(RagError::index_unavailable(
                    QDRANT_BACKEND,
                    format!("Failed to search collection {}: {}", collection, e),
                ))
            }
        };

        // Convert scored points back into search results
        let results = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let id = match scored_point.id?.point_id_options? {
                    PointIdOptions::Uuid(raw) => Uuid::parse_str(&raw).ok()?,
                    PointIdOptions::Num(_) => return None,
                };
                let payload = scored_point.payload;

                Some(SearchResult {
                    id,
                    score: scored_point.score,
                    text: payload_str(&payload, "text").unwrap_or_default(),
                    metadata: ChunkMetadata {
                        document_ref: payload_str(&payload, "document_ref").unwrap_or_default(),
                        format: payload_str(&payload, "format")
                            .and_then(|f| serde_json::from_value(json!(f)).ok()),
                        chunk_index: payload_usize(&payload, "chunk_index"),
                        total_chunks: payload_usize(&payload, "total_chunks"),
                        byte_length: payload_usize(&payload, "byte_length"),
                    },
                })
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PointId> = ids.iter().map(|id| id.to_string().into()).collect();
        match self
            .client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(RagError::index_unavailable(
                QDRANT_BACKEND,
                format!("Failed to delete points from {}: {}", collection, e),
            )),
        }
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        if !self.collection_exists(collection).await? {
            return Ok(());
        }

        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| {
                RagError::index_unavailable(
                    QDRANT_BACKEND,
                    format!("Failed to delete collection {}: {}", collection, e),
                )
            })?;

        info!("Cleared collection {}", collection);
        Ok(())
    }
}

fn is_not_found(error: &QdrantError) -> bool {
    matches!(
        error,
        QdrantError::ResponseError { status } if status.code() == tonic::Code::NotFound
    )
}

fn is_already_exists(error: &QdrantError) -> bool {
    matches!(
        error,
        QdrantError::ResponseError { status } if status.code() == tonic::Code::AlreadyExists
    )
}

fn map_err(error: QdrantError) -> RagError {
    RagError::index_unavailable(QDRANT_BACKEND, error)
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key)?.as_str().map(|s| s.to_string())
}

fn payload_usize(payload: &HashMap<String, Value>, key: &str) -> usize {
    payload
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|v| v.max(0) as usize)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_error(code: tonic::Code) -> QdrantError {
        QdrantError::ResponseError {
            status: tonic::Status::new(code, "collection rag-system"),
        }
    }

    #[test]
    fn test_response_codes_classified() {
        assert!(is_already_exists(&response_error(tonic::Code::AlreadyExists)));
        assert!(!is_already_exists(&response_error(tonic::Code::Unavailable)));
        assert!(is_not_found(&response_error(tonic::Code::NotFound)));
        assert!(!is_not_found(&response_error(tonic::Code::AlreadyExists)));
    }

    #[test]
    fn test_unexpected_errors_map_to_index_unavailable() {
        match map_err(response_error(tonic::Code::Unavailable)) {
            RagError::IndexUnavailable { backend, .. } => assert_eq!(backend, QDRANT_BACKEND),
            other => panic!("expected IndexUnavailable, got {:?}", other),
        }
    }
}
