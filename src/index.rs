use crate::database::{ChunkMetadata, SearchResult, StoredPoint, VectorStore};
use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

/// Stored chunk text is capped to bound payload size
pub const MAX_STORED_TEXT_CHARS: usize = 1000;

/// A text to embed and index together with its metadata
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Named collection of embedded chunks searchable by cosine similarity
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl VectorIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        VectorIndex {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &str {
        self.store.backend()
    }

    /// Create the collection with the embedder's dimension, reusing it if present
    pub async fn ensure_collection(&self) -> Result<()> {
        self.store
            .create_collection(&self.collection, self.embedder.dimension())
            .await
    }

    /// Embed and store every document, returning fresh IDs in input order
    pub async fn upsert(&self, documents: &[IndexDocument]) -> Result<Vec<Uuid>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_collection().await?;

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        let expected = self.embedder.dimension();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let points: Vec<StoredPoint> = documents
            .iter()
            .zip(embeddings)
            .map(|(document, vector)| StoredPoint {
                id: Uuid::new_v4(),
                vector,
                text: truncate_chars(&document.text, MAX_STORED_TEXT_CHARS),
                metadata: document.metadata.clone(),
            })
            .collect();
        let ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();

        self.store.upsert(&self.collection, points).await?;
        info!(
            "Added {} documents to collection {}",
            ids.len(),
            self.collection
        );

        Ok(ids)
    }

    /// Return the `top_k` entries most similar to `text`, best first
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_one(text).await?;
        let results = self.store.search(&self.collection, &vector, top_k).await?;
        debug!(
            "Query matched {} entries in {}",
            results.len(),
            self.collection
        );
        Ok(results)
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<()> {
        self.store.delete(&self.collection, ids).await?;
        info!("Deleted {} documents from {}", ids.len(), self.collection);
        Ok(())
    }

    /// Remove every entry; the collection is recreated on the next upsert
    pub async fn clear(&self) -> Result<()> {
        self.store.clear(&self.collection).await?;
        info!("Cleared all documents from {}", self.collection);
        Ok(())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_end, _)) => text[..byte_end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::memory::InMemoryStore;

    fn metadata(chunk_index: usize) -> ChunkMetadata {
        ChunkMetadata {
            document_ref: "https://x.io/policy.txt".to_string(),
            format: None,
            chunk_index,
            total_chunks: 3,
            byte_length: 42,
        }
    }

    fn index() -> (VectorIndex, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let index = VectorIndex::new(Arc::new(HashingEmbedder::default()), store.clone(), "test");
        (index, store)
    }

    fn doc(text: &str, chunk_index: usize) -> IndexDocument {
        IndexDocument {
            text: text.to_string(),
            metadata: metadata(chunk_index),
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("ñañaña", 2), "ña");
    }

    #[tokio::test]
    async fn test_upsert_then_query_round_trip() {
        let (index, _) = index();
        let ids = index
            .upsert(&[doc("the grace period is thirty days", 0)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let results = index
            .query("the grace period is thirty days", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ids[0]);
        assert_eq!(results[0].text, "the grace period is thirty days");
        assert_eq!(results[0].metadata, metadata(0));
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_ordered() {
        let (index, store) = index();
        let ids = index
            .upsert(&[doc("alpha", 0), doc("beta", 1), doc("gamma", 2)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(store.len("test").await, 3);

        let beta = index.query("beta", 1).await.unwrap();
        assert_eq!(beta[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_stored_text_is_truncated() {
        let (index, _) = index();
        let long = "word ".repeat(400);
        index.upsert(&[doc(&long, 0)]).await.unwrap();

        let results = index.query(&long, 1).await.unwrap();
        assert_eq!(results[0].text.chars().count(), MAX_STORED_TEXT_CHARS);
        assert!(long.starts_with(&results[0].text));
    }

    #[tokio::test]
    async fn test_query_empty_index_and_zero_top_k() {
        let (index, _) = index();
        assert!(index.query("anything", 5).await.unwrap().is_empty());

        index.upsert(&[doc("alpha", 0)]).await.unwrap();
        assert!(index.query("alpha", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_sorted_by_score() {
        let (index, _) = index();
        index
            .upsert(&[
                doc("premium payment grace period", 0),
                doc("maternity expenses waiting period", 1),
                doc("cataract surgery", 2),
            ])
            .await
            .unwrap();

        let results = index.query("grace period for premium", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].metadata.chunk_index, 0);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (index, store) = index();
        let ids = index.upsert(&[doc("alpha", 0), doc("beta", 1)]).await.unwrap();

        index.delete(&ids[..1]).await.unwrap();
        index.delete(&ids[..1]).await.unwrap();
        assert_eq!(store.len("test").await, 1);

        index.clear().await.unwrap();
        assert!(index.query("beta", 5).await.unwrap().is_empty());

        // The collection comes back on the next write
        index.upsert(&[doc("gamma", 0)]).await.unwrap();
        assert_eq!(store.len("test").await, 1);
    }
}
