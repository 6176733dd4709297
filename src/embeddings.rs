use crate::error::Result;
use async_trait::async_trait;

/// Width of every vector stored in the index
pub const EMBEDDING_DIMENSION: usize = 384;

/// Representation of a vector embedding
pub type Embedding = Vec<f32>;

/// Maps text to fixed-width vectors.
///
/// Implementations must be deterministic, return one vector per input in input order,
/// and always produce vectors of `dimension()` width.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Generate the embedding for a single text
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed(&[text]).await?;
        Ok(embeddings.pop().unwrap_or_else(|| vec![0.0; self.dimension()]))
    }
}

/// Bag-of-hashed-words embedder.
///
/// Each lower-cased whitespace token increments one coordinate picked by a stable
/// FNV-1a hash, and the counts are L2-normalized. It captures word overlap only and
/// stands in until a real embedding model is wired behind [`Embedder`].
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        HashingEmbedder::new(EMBEDDING_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder {
            dimension: dimension.max(1),
        }
    }

    /// Embed a single text; empty or whitespace-only text yields the zero vector
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.to_lowercase().split_whitespace() {
            let slot = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("What is the grace period for premium payment?");
        let b = embedder.embed_text("What is the grace period for premium payment?");
        assert_eq!(a.len(), EMBEDDING_DIMENSION);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::default();
        for text in ["", "   \n\t "] {
            let v = embedder.embed_text(text);
            assert_eq!(v.len(), EMBEDDING_DIMENSION);
            assert!(v.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_case_and_spacing_are_ignored() {
        let embedder = HashingEmbedder::default();
        assert_eq!(
            embedder.embed_text("Grace  Period"),
            embedder.embed_text("grace period")
        );
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashingEmbedder::default();
        let texts = ["alpha beta", "", "gamma"];
        let batch = embedder.embed(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &embedder.embed_text(text));
        }
    }

    proptest! {
        #[test]
        fn prop_nonempty_embeddings_are_unit_length(text in "[a-zA-Z ]{0,200}") {
            let v = HashingEmbedder::default().embed_text(&text);
            prop_assert_eq!(v.len(), EMBEDDING_DIMENSION);
            if text.split_whitespace().next().is_some() {
                prop_assert!((norm(&v) - 1.0).abs() < 1e-5);
            } else {
                prop_assert_eq!(norm(&v), 0.0);
            }
        }
    }
}
