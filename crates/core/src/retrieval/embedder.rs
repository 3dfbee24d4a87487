use async_trait::async_trait;

use super::RetrievalError;

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

/// Embedding collaborator: maps text to fixed-dimension vectors.
///
/// Implementations must return one vector per input, all of the same length, and should be
/// deterministic for a given model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model, e.g. `hashing:d384`.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

/// Local feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed with blake3 into `dim` buckets and the bucket
/// counts are L2-normalized. Texts that share vocabulary land close together, which is all the
/// knowledge base needs for offline use and tests.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dim];
        for token in tokens(text) {
            let hash = blake3::hash(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dim as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
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
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashingEmbedder};

    // Both vectors come out of the embedder already unit length.
    fn dot(left: &[f32], right: &[f32]) -> f32 {
        left.iter().zip(right).map(|(a, b)| a * b).sum()
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["Max Capacity: 50".to_string(), "Max Capacity: 50".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("embed");

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), 64);
        let norm = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_unrelated_text() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_text("what is the cancellation policy");
        let related = embedder.embed_text("Cancellation policy: 24 hours notice required.");
        let unrelated = embedder.embed_text("Paneer tikka, garlic naan, mango lassi.");

        assert!(
            dot(&query, &related) > dot(&query, &unrelated),
            "related text should be closer"
        );
    }

    #[test]
    fn tokenization_ignores_case_and_punctuation() {
        let embedder = HashingEmbedder::default();
        assert_eq!(embedder.embed_text("CAPACITY!"), embedder.embed_text("capacity"));
    }
}
