//! Per-turn grounding lookup over a swappable index.
//!
//! Queries clone the current `Arc<RetrievalIndex>` under a short read lock
//! and search it without holding any lock. A rebuild embeds the new corpus
//! off to the side and only takes the write lock to swap the pointer, so
//! in-flight queries finish against the index they started with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::chunking::TextSplitter;
use super::corpus::load_or_sample;
use super::embeddings::EmbeddingService;
use super::index::{fingerprint, RetrievalIndex};
use super::types::{CorpusRecord, ScoredChunk};
use crate::config::RetrievalConfig;
use crate::error::{ConfigError, GroundingError};

/// How the active index came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Built,
    Snapshot,
    Empty,
}

/// Snapshot of retrieval health for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalStatus {
    pub enabled: bool,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub index_path: Option<PathBuf>,
    pub origin: IndexOrigin,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ActiveIndex {
    index: Arc<RetrievalIndex>,
    origin: IndexOrigin,
    updated_at: DateTime<Utc>,
}

/// Grounding retriever.
#[derive(Debug)]
pub struct Retriever {
    active: RwLock<ActiveIndex>,
    embedder: Arc<dyn EmbeddingService>,
    splitter: TextSplitter,
    config: RetrievalConfig,
}

impl Retriever {
    /// A retriever with no chunks. Every lookup returns nothing.
    pub fn empty(
        config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self, ConfigError> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            active: RwLock::new(ActiveIndex {
                index: Arc::new(RetrievalIndex::empty(embedder.model())),
                origin: IndexOrigin::Empty,
                updated_at: Utc::now(),
            }),
            embedder,
            splitter,
            config,
        })
    }

    /// Load the configured corpus and bring up an index for it.
    ///
    /// A snapshot at `index_path` is reused when its fingerprint matches the
    /// corpus, model, and chunking policy; otherwise the index is rebuilt and
    /// the snapshot rewritten.
    pub async fn open(
        config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self, GroundingError> {
        let records = load_or_sample(config.corpus_path.as_deref());
        Self::open_with_records(config, embedder, &records).await
    }

    /// [`Retriever::open`] over an explicit record set.
    pub async fn open_with_records(
        config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingService>,
        records: &[CorpusRecord],
    ) -> Result<Self, GroundingError> {
        let retriever = Self::empty(config, embedder)?;

        if !retriever.config.enabled {
            log::info!("Retrieval disabled; skipping index load");
            return Ok(retriever);
        }

        let expected = fingerprint(records, retriever.embedder.model(), &retriever.splitter);
        if let Some(path) = retriever.config.index_path.clone() {
            if path.exists() {
                match RetrievalIndex::load_matching_async(path.clone(), expected).await {
                    Ok(index) => {
                        log::info!(
                            "Loaded index snapshot with {} chunks from {}",
                            index.len(),
                            path.display()
                        );
                        retriever.swap(Arc::new(index), IndexOrigin::Snapshot);
                        return Ok(retriever);
                    }
                    Err(e) => log::warn!("Ignoring snapshot {}: {}", path.display(), e),
                }
            }
        }

        retriever.rebuild(records).await?;
        Ok(retriever)
    }

    /// Build a new index from `records` and swap it in.
    ///
    /// Returns the new chunk count. The previous index stays active until the
    /// build succeeds; on failure it is kept.
    pub async fn rebuild(&self, records: &[CorpusRecord]) -> Result<usize, GroundingError> {
        let index = RetrievalIndex::build(
            records,
            &self.splitter,
            self.embedder.as_ref(),
            self.config.build_concurrency,
        )
        .await?;
        let index = Arc::new(index);

        if let Some(path) = self.config.index_path.clone() {
            if let Err(e) = Arc::clone(&index).save_async(path.clone()).await {
                log::warn!("Failed to save index snapshot to {}: {}", path.display(), e);
            }
        }

        let count = index.len();
        self.swap(index, IndexOrigin::Built);
        log::info!("Retrieval index rebuilt with {} chunks", count);
        Ok(count)
    }

    fn swap(&self, index: Arc<RetrievalIndex>, origin: IndexOrigin) {
        let mut active = self.active.write();
        *active = ActiveIndex {
            index,
            origin,
            updated_at: Utc::now(),
        };
    }

    /// The currently active index.
    pub fn current(&self) -> Arc<RetrievalIndex> {
        Arc::clone(&self.active.read().index)
    }

    /// Top chunks for `query`, restricted to `persona_id` when the persona
    /// filter is on.
    ///
    /// Never fails: a disabled retriever, an empty index, an embedding error,
    /// or a timeout all yield an empty list.
    pub async fn retrieve(&self, query: &str, persona_id: &str) -> Vec<ScoredChunk> {
        if !self.config.enabled {
            return Vec::new();
        }
        match self.try_retrieve(query, persona_id).await {
            Ok(chunks) => {
                log::debug!("Retrieved {} chunks for persona '{}'", chunks.len(), persona_id);
                chunks
            }
            Err(GroundingError::EmptyIndex) => Vec::new(),
            Err(e) => {
                log::warn!("Grounding unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Fallible lookup with the configured deadline.
    pub async fn try_retrieve(
        &self,
        query: &str,
        persona_id: &str,
    ) -> Result<Vec<ScoredChunk>, GroundingError> {
        let index = self.current();
        let timeout_ms = self.config.query_timeout_ms;
        let lookup = async {
            if self.config.persona_filter {
                index
                    .query_filtered(self.embedder.as_ref(), query, self.config.top_k, persona_id)
                    .await
            } else {
                index
                    .query(self.embedder.as_ref(), query, self.config.top_k)
                    .await
            }
        };
        tokio::time::timeout(Duration::from_millis(timeout_ms), lookup)
            .await
            .map_err(|_| GroundingError::Timeout(timeout_ms))?
    }

    pub fn status(&self) -> RetrievalStatus {
        let active = self.active.read();
        RetrievalStatus {
            enabled: self.config.enabled,
            chunk_count: active.index.len(),
            embedding_model: self.embedder.model().to_string(),
            index_path: self.config.index_path.clone(),
            origin: active.origin,
            updated_at: active.updated_at,
        }
    }

    pub fn index_path(&self) -> Option<&Path> {
        self.config.index_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::corpus::sample_corpus;
    use crate::rag::embeddings::HashingEmbedding;
    use crate::testing::{FailingEmbedding, SlowEmbedding};

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            embedding_provider: "hashing".to_string(),
            ..RetrievalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_builds_from_sample_corpus() {
        let retriever = Retriever::open(config(), Arc::new(HashingEmbedding::default()))
            .await
            .unwrap();
        let status = retriever.status();
        assert!(status.enabled);
        assert!(status.chunk_count > 0);
        assert_eq!(status.origin, IndexOrigin::Built);

        let chunks = retriever.retrieve("blood sugar", "robert").await;
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 5);
        assert!(chunks.iter().all(|c| c.chunk.applies_to("robert")));
    }

    #[tokio::test]
    async fn test_open_reuses_matching_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RetrievalConfig {
            index_path: Some(dir.path().join("index.json")),
            ..config()
        };
        let embedder: Arc<dyn EmbeddingService> = Arc::new(HashingEmbedding::default());

        let first = Retriever::open(cfg.clone(), Arc::clone(&embedder)).await.unwrap();
        assert_eq!(first.status().origin, IndexOrigin::Built);

        let second = Retriever::open(cfg.clone(), Arc::clone(&embedder)).await.unwrap();
        assert_eq!(second.status().origin, IndexOrigin::Snapshot);
        assert_eq!(second.status().chunk_count, first.status().chunk_count);

        // a different chunking policy invalidates the snapshot
        let third = Retriever::open(
            RetrievalConfig {
                chunk_size: 64,
                chunk_overlap: 16,
                ..cfg
            },
            embedder,
        )
        .await
        .unwrap();
        assert_eq!(third.status().origin, IndexOrigin::Built);
    }

    #[tokio::test]
    async fn test_embedding_failure_yields_empty() {
        let retriever = Retriever::open(config(), Arc::new(HashingEmbedding::default()))
            .await
            .unwrap();
        // swap in a failing embedder by building a second retriever around the same index
        let broken = Retriever {
            active: RwLock::new(ActiveIndex {
                index: retriever.current(),
                origin: IndexOrigin::Built,
                updated_at: Utc::now(),
            }),
            embedder: Arc::new(FailingEmbedding),
            splitter: TextSplitter::default(),
            config: config(),
        };
        assert!(broken.retrieve("anything", "margaret").await.is_empty());
        assert!(broken.try_retrieve("anything", "margaret").await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_yields_empty() {
        let retriever = Retriever::open(config(), Arc::new(HashingEmbedding::default()))
            .await
            .unwrap();
        let slow = Retriever {
            active: RwLock::new(ActiveIndex {
                index: retriever.current(),
                origin: IndexOrigin::Built,
                updated_at: Utc::now(),
            }),
            embedder: Arc::new(SlowEmbedding::new(Duration::from_millis(500))),
            splitter: TextSplitter::default(),
            config: RetrievalConfig {
                query_timeout_ms: 20,
                ..config()
            },
        };
        let err = slow.try_retrieve("hello", "margaret").await.unwrap_err();
        assert!(matches!(err, GroundingError::Timeout(20)));
        assert!(slow.retrieve("hello", "margaret").await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_and_empty() {
        let disabled = Retriever::open(
            RetrievalConfig {
                enabled: false,
                ..config()
            },
            Arc::new(HashingEmbedding::default()),
        )
        .await
        .unwrap();
        assert!(disabled.retrieve("hello", "margaret").await.is_empty());
        assert_eq!(disabled.status().origin, IndexOrigin::Empty);

        let empty = Retriever::empty(config(), Arc::new(HashingEmbedding::default())).unwrap();
        assert!(empty.retrieve("hello", "margaret").await.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_swaps_index() {
        let retriever = Retriever::empty(config(), Arc::new(HashingEmbedding::default())).unwrap();
        let before = retriever.current();
        let count = retriever.rebuild(&sample_corpus()).await.unwrap();
        assert_eq!(count, retriever.status().chunk_count);
        assert!(before.is_empty());
        assert!(!retriever.current().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        let retriever = Retriever::open(config(), Arc::new(HashingEmbedding::default()))
            .await
            .unwrap();
        let count = retriever.status().chunk_count;
        let broken = Retriever {
            active: RwLock::new(ActiveIndex {
                index: retriever.current(),
                origin: IndexOrigin::Built,
                updated_at: Utc::now(),
            }),
            embedder: Arc::new(FailingEmbedding),
            splitter: TextSplitter::default(),
            config: config(),
        };
        assert!(broken.rebuild(&sample_corpus()).await.is_err());
        assert_eq!(broken.status().chunk_count, count);
    }
}
