//! Retrieval grounding over example caregiver dialogue.
//!
//! ```text
//! CorpusRecord ──TextSplitter──▶ Chunk ──EmbeddingService──▶ RetrievalIndex
//!                                                             │  (JSON snapshot)
//! query text ──EmbeddingService──▶ cosine top-k ◀─────────────┘
//! ```
//!
//! [`Retriever`] owns the active index behind a read-mostly lock and turns
//! every lookup failure into "no grounding".

pub mod chunking;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod retriever;
pub mod types;

pub use chunking::TextSplitter;
pub use corpus::sample_corpus;
pub use embeddings::{create_embedder, EmbeddingService, HashingEmbedding, OllamaEmbedding};
pub use index::RetrievalIndex;
pub use retriever::{IndexOrigin, RetrievalStatus, Retriever};
pub use types::{Chunk, ChunkMetadata, CorpusRecord, ScoredChunk};
