//! Deterministic feature-hashing embedder.
//!
//! Each token and adjacent token pair is hashed into one of `dimension`
//! buckets with a sign taken from the hash, and the vector is L2-normalized.
//! Texts that share words therefore have positive cosine similarity.

use async_trait::async_trait;

use super::EmbeddingService;
use crate::error::EmbeddingError;
use crate::utilities::text::{stable_hash, tokenize};

#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    model: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model: format!("hashing-{}", dimension),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        let features = tokens
            .iter()
            .map(|t| (t.clone(), 1.0f32))
            .chain(
                tokens
                    .windows(2)
                    .map(|pair| (format!("{} {}", pair[0], pair[1]), 0.5f32)),
            );

        for (feature, weight) in features {
            let h = stable_hash(&feature);
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedding {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}
