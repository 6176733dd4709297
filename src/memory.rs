use crate::database::{SearchResult, StoredPoint, VectorStore};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

const MEMORY_BACKEND: &str = "memory";

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: HashMap<Uuid, StoredPoint>,
}

/// In-process vector store using exhaustive cosine similarity search.
///
/// Nothing is persisted; the store lives as long as the process. Used when no
/// Qdrant endpoint is configured and as the backend for tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points held by a collection (0 if it does not exist)
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &str {
        MEMORY_BACKEND
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: HashMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<StoredPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| {
            RagError::index_unavailable(
                MEMORY_BACKEND,
                format!("collection '{}' does not exist", collection),
            )
        })?;

        // Validate the whole batch first so a bad point never leaves a partial write
        if let Some(bad) = points.iter().find(|p| p.vector.len() != store.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension,
                actual: bad.vector.len(),
            });
        }

        let count = points.len();
        for point in points {
            store.points.insert(point.id, point);
        }
        debug!("Upserted {} points into {}", count, collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let Some(store) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<SearchResult> = store
            .points
            .values()
            .map(|point| SearchResult {
                id: point.id,
                score: cosine_similarity(&point.vector, vector),
                text: point.text.clone(),
                metadata: point.metadata.clone(),
            })
            .collect();

        // Ties are broken by ID so results are reproducible
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(store) = collections.get_mut(collection) {
            for id in ids {
                store.points.remove(id);
            }
        }
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChunkMetadata;
    use proptest::prelude::*;

    fn point(vector: Vec<f32>, text: &str) -> StoredPoint {
        StoredPoint {
            id: Uuid::new_v4(),
            vector,
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_ref: "doc".to_string(),
                format: None,
                chunk_index: 0,
                total_chunks: 1,
                byte_length: 0,
            },
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let store = InMemoryStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert("docs", vec![point(vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        store.create_collection("docs", 2).await.unwrap();
        assert_eq!(store.len("docs").await, 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point(vec![0.0, 1.0], "orthogonal"),
                    point(vec![1.0, 0.0], "same"),
                    point(vec![1.0, 1.0], "diagonal"),
                ],
            )
            .await
            .unwrap();

        let results = store.search("docs", &[1.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["same", "diagonal"]);
    }

    #[tokio::test]
    async fn test_missing_collection_searches_empty() {
        let store = InMemoryStore::new();
        assert!(store.search("nothing", &[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_without_collection_fails() {
        let store = InMemoryStore::new();
        let err = store
            .upsert("nothing", vec![point(vec![1.0], "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension_atomically() {
        let store = InMemoryStore::new();
        store.create_collection("docs", 2).await.unwrap();
        let err = store
            .upsert(
                "docs",
                vec![point(vec![1.0, 0.0], "ok"), point(vec![1.0], "short")],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(store.len("docs").await, 0);
    }

    #[tokio::test]
    async fn test_delete_and_clear_are_idempotent() {
        let store = InMemoryStore::new();
        store.create_collection("docs", 1).await.unwrap();
        let p = point(vec![1.0], "a");
        let id = p.id;
        store.upsert("docs", vec![p]).await.unwrap();

        store.delete("docs", &[id, Uuid::new_v4()]).await.unwrap();
        store.delete("docs", &[id]).await.unwrap();
        store.delete("missing", &[id]).await.unwrap();
        assert_eq!(store.len("docs").await, 0);

        store.clear("docs").await.unwrap();
        store.clear("docs").await.unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_results_sorted_and_bounded(
            vectors in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 4), 0..20),
            query in proptest::collection::vec(-1.0f32..1.0, 4),
            top_k in 0usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryStore::new();
                store.create_collection("docs", 4).await.unwrap();
                let points = vectors.iter().map(|v| point(v.clone(), "x")).collect();
                store.upsert("docs", points).await.unwrap();
                store.search("docs", &query, top_k).await.unwrap()
            });

            prop_assert!(results.len() <= top_k);
            prop_assert!(results.len() <= vectors.len());
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
