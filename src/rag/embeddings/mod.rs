//! Embedding service boundary.
//!
//! The same service embeds chunks at build time and queries at lookup time.
//! Two backends are provided:
//!
//! - [`OllamaEmbedding`] calls a local Ollama server;
//! - [`HashingEmbedding`] is a deterministic feature-hashing embedder that
//!   needs no network and is used offline and in tests.

pub mod hashing;
pub mod ollama;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RetrievalConfig;
use crate::error::EmbeddingError;

pub use hashing::HashingEmbedding;
pub use ollama::OllamaEmbedding;

/// Text → fixed-dimension vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync + std::fmt::Debug {
    /// Model identifier, recorded in index snapshots.
    fn model(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Build the embedder named by `retrieval.embedding_provider`.
///
/// Unknown provider names fall back to Ollama.
pub fn create_embedder(config: &RetrievalConfig) -> Arc<dyn EmbeddingService> {
    match config.embedding_provider.to_lowercase().as_str() {
        "hashing" | "local" => Arc::new(HashingEmbedding::default()),
        "ollama" => Arc::new(OllamaEmbedding::new(
            &config.embedding_url,
            &config.embedding_model,
        )),
        other => {
            log::warn!("Unknown embedding provider '{}', using ollama", other);
            Arc::new(OllamaEmbedding::new(
                &config.embedding_url,
                &config.embedding_model,
            ))
        }
    }
}

/// Cosine similarity of two vectors. Zero for empty, mismatched, or
/// zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}
