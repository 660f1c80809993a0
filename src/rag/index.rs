//! In-memory vector index over corpus chunks.
//!
//! Every chunk owns exactly one embedding. Lookup is a brute-force cosine
//! scan, which is plenty for a training corpus of a few thousand lines.
//! The whole index serializes to a JSON snapshot so later process starts
//! can skip re-embedding; the snapshot records a fingerprint of the corpus,
//! embedding model, and chunking policy, and is only reused when all three
//! match.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::chunking::TextSplitter;
use super::embeddings::{cosine_similarity, EmbeddingService};
use super::types::{Chunk, CorpusRecord, ScoredChunk};
use crate::error::{EmbeddingError, GroundingError};
use crate::utilities::text::sha256_hex;

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Identity of an index build: corpus content, embedding model, and chunking
/// policy. Any change produces a different fingerprint.
pub fn fingerprint(records: &[CorpusRecord], model: &str, splitter: &TextSplitter) -> String {
    let mut material = String::new();
    for r in records {
        material.push_str(&r.persona);
        material.push('\u{1f}');
        material.push_str(&r.condition);
        material.push('\u{1f}');
        material.push_str(r.emotion.as_deref().unwrap_or(""));
        material.push('\u{1f}');
        material.push_str(&r.source);
        material.push('\u{1f}');
        material.push_str(&r.text);
        material.push('\u{1e}');
    }
    material.push_str(&format!(
        "{}|{}|{}",
        model,
        splitter.chunk_size(),
        splitter.chunk_overlap()
    ));
    sha256_hex(&material)
}

// ---------------------------------------------------------------------------
// RetrievalIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Embedded chunks plus build provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalIndex {
    model: String,
    dimension: usize,
    fingerprint: String,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl RetrievalIndex {
    /// An index with no chunks. Every query on it reports [`GroundingError::EmptyIndex`].
    pub fn empty(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimension: 0,
            fingerprint: String::new(),
            built_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Chunk and embed a corpus.
    ///
    /// Up to `concurrency` embedding requests run at once; chunk order is
    /// preserved. Fails on the first embedding error or on vectors of
    /// differing dimension.
    pub async fn build(
        records: &[CorpusRecord],
        splitter: &TextSplitter,
        embedder: &dyn EmbeddingService,
        concurrency: usize,
    ) -> Result<Self, GroundingError> {
        let chunks = splitter.split_records(records);
        log::info!(
            "Embedding {} chunks from {} records with '{}'",
            chunks.len(),
            records.len(),
            embedder.model()
        );

        let entries: Vec<IndexEntry> = stream::iter(chunks)
            .map(|chunk| async move {
                let embedding = embedder.embed(&chunk.text).await?;
                Ok::<_, EmbeddingError>(IndexEntry { chunk, embedding })
            })
            .buffered(concurrency.max(1))
            .try_collect()
            .await?;

        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.len(),
            }
            .into());
        }

        Ok(Self {
            model: embedder.model().to_string(),
            dimension,
            fingerprint: fingerprint(records, embedder.model(), splitter),
            built_at: Utc::now(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Top-k chunks for a query vector, similarity descending.
    pub fn search<F>(
        &self,
        query: &[f32],
        top_k: usize,
        filter: F,
    ) -> Result<Vec<ScoredChunk>, GroundingError>
    where
        F: Fn(&Chunk) -> bool,
    {
        if self.entries.is_empty() {
            return Err(GroundingError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .filter(|e| filter(&e.chunk))
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                similarity: cosine_similarity(query, &e.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Embed `text` and return the top-k chunks.
    pub async fn query(
        &self,
        embedder: &dyn EmbeddingService,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, GroundingError> {
        let vector = self.embed_query(embedder, text).await?;
        self.search(&vector, top_k, |_| true)
    }

    /// Like [`RetrievalIndex::query`], keeping only chunks tagged for
    /// `persona_id` or "general".
    pub async fn query_filtered(
        &self,
        embedder: &dyn EmbeddingService,
        text: &str,
        top_k: usize,
        persona_id: &str,
    ) -> Result<Vec<ScoredChunk>, GroundingError> {
        let vector = self.embed_query(embedder, text).await?;
        self.search(&vector, top_k, |chunk| chunk.applies_to(persona_id))
    }

    async fn embed_query(
        &self,
        embedder: &dyn EmbeddingService,
        text: &str,
    ) -> Result<Vec<f32>, GroundingError> {
        if self.entries.is_empty() {
            return Err(GroundingError::EmptyIndex);
        }
        if embedder.model() != self.model {
            log::warn!(
                "Query embedder '{}' differs from index model '{}'",
                embedder.model(),
                self.model
            );
        }
        Ok(embedder.embed(text).await?)
    }

    // -----------------------------------------------------------------------
    // Snapshot persistence
    // -----------------------------------------------------------------------

    /// Write the index as JSON, creating parent directories.
    ///
    /// The snapshot is written to a sibling temp file and renamed into place,
    /// so a reader never sees a half-written file.
    pub fn save(&self, path: &Path) -> Result<(), GroundingError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp)?;
            serde_json::to_writer(BufWriter::new(file), self)?;
        }
        fs::rename(&tmp, path)?;
        log::info!("Saved index snapshot ({} chunks) to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a snapshot written by [`RetrievalIndex::save`].
    pub fn load(path: &Path) -> Result<Self, GroundingError> {
        let file = fs::File::open(path)?;
        let index: Self = serde_json::from_reader(BufReader::new(file))?;
        if index.entries.iter().any(|e| e.embedding.len() != index.dimension) {
            return Err(GroundingError::StaleSnapshot(format!(
                "{} has embeddings of inconsistent dimension",
                path.display()
            )));
        }
        Ok(index)
    }

    /// Load a snapshot and require a matching fingerprint.
    pub fn load_matching(path: &Path, expected: &str) -> Result<Self, GroundingError> {
        let index = Self::load(path)?;
        if index.fingerprint != expected {
            return Err(GroundingError::StaleSnapshot(format!(
                "fingerprint {} does not match {}",
                index.fingerprint, expected
            )));
        }
        Ok(index)
    }

    /// [`RetrievalIndex::save`] on the blocking thread pool.
    pub async fn save_async(self: Arc<Self>, path: PathBuf) -> Result<(), GroundingError> {
        tokio::task::spawn_blocking(move || self.save(&path)).await?
    }

    /// [`RetrievalIndex::load_matching`] on the blocking thread pool.
    pub async fn load_matching_async(
        path: PathBuf,
        expected: String,
    ) -> Result<Self, GroundingError> {
        tokio::task::spawn_blocking(move || Self::load_matching(&path, &expected)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::corpus::sample_corpus;
    use crate::rag::embeddings::HashingEmbedding;
    use crate::testing::FailingEmbedding;

    async fn sample_index() -> RetrievalIndex {
        RetrievalIndex::build(
            &sample_corpus(),
            &TextSplitter::default(),
            &HashingEmbedding::default(),
            4,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_has_one_embedding_per_chunk() {
        let records = sample_corpus();
        let splitter = TextSplitter::default();
        let index = sample_index().await;
        assert_eq!(index.len(), splitter.split_records(&records).len());
        assert_eq!(index.dimension(), 256);
        assert_eq!(index.model(), "hashing-256");
    }

    #[tokio::test]
    async fn test_query_is_bounded_and_ordered() {
        let index = sample_index().await;
        let embedder = HashingEmbedding::default();
        for k in [1, 3, 5, 100] {
            let results = index
                .query(&embedder, "blood sugar levels and blurry vision", k)
                .await
                .unwrap();
            assert!(results.len() <= k);
            assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
            assert!(results.iter().all(|r| r.similarity.is_finite()));
        }
    }

    #[tokio::test]
    async fn test_query_finds_relevant_chunk() {
        let index = sample_index().await;
        let results = index
            .query(&HashingEmbedding::default(), "Eleanor walker falling", 3)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.metadata.persona, "eleanor");
    }

    #[tokio::test]
    async fn test_query_filtered_excludes_other_personas() {
        let index = sample_index().await;
        let results = index
            .query_filtered(&HashingEmbedding::default(), "walker falling", 50, "robert")
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|r| r.chunk.metadata.persona == "robert" || r.chunk.metadata.persona == "general"));
    }

    #[tokio::test]
    async fn test_empty_index_errors() {
        let index = RetrievalIndex::empty("hashing-256");
        let err = index
            .query(&HashingEmbedding::default(), "hello", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, GroundingError::EmptyIndex));
    }

    #[tokio::test]
    async fn test_build_propagates_embedding_error() {
        let result = RetrievalIndex::build(
            &sample_corpus(),
            &TextSplitter::default(),
            &FailingEmbedding,
            2,
        )
        .await;
        assert!(matches!(result, Err(GroundingError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let index = Arc::new(sample_index().await);
        Arc::clone(&index).save_async(path.clone()).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded =
            RetrievalIndex::load_matching_async(path.clone(), index.fingerprint().to_string())
                .await
                .unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.fingerprint(), index.fingerprint());

        let stale = RetrievalIndex::load_matching(&path, "something-else");
        assert!(matches!(stale, Err(GroundingError::StaleSnapshot(_))));
    }

    #[test]
    fn test_fingerprint_changes_with_inputs() {
        let records = sample_corpus();
        let splitter = TextSplitter::default();
        let base = fingerprint(&records, "m", &splitter);
        assert_eq!(base, fingerprint(&records, "m", &splitter));
        assert_ne!(base, fingerprint(&records, "other", &splitter));
        assert_ne!(
            base,
            fingerprint(&records, "m", &TextSplitter::new(256, 50).unwrap())
        );
        assert_ne!(base, fingerprint(&records[1..], "m", &splitter));
    }
}
