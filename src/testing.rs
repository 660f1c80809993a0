//! Test doubles for the completion and embedding boundaries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{EmbeddingError, LLMError};
use crate::llms::base_llm::{BaseLLM, GenerationParams, LLMMessage};
use crate::rag::embeddings::{EmbeddingService, HashingEmbedding};

/// Returns scripted replies in order, repeating the last one once exhausted.
#[derive(Debug)]
pub struct ScriptedLLM {
    replies: Vec<String>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<LLMMessage>>,
}

impl ScriptedLLM {
    pub fn repeating(reply: &str) -> Self {
        Self::sequence(vec![reply])
    }

    pub fn sequence(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(str::to_string).collect(),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<LLMMessage> {
        self.last_messages.lock().clone()
    }
}

#[async_trait]
impl BaseLLM for ScriptedLLM {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn acall(
        &self,
        messages: &[LLMMessage],
        _params: &GenerationParams,
    ) -> Result<String, LLMError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock() = messages.to_vec();
        let idx = n.min(self.replies.len().saturating_sub(1));
        Ok(self.replies.get(idx).cloned().unwrap_or_default())
    }
}

/// Always fails with an API error.
#[derive(Debug)]
pub struct FailingLLM;

#[async_trait]
impl BaseLLM for FailingLLM {
    fn model(&self) -> &str {
        "failing"
    }

    async fn acall(
        &self,
        _messages: &[LLMMessage],
        _params: &GenerationParams,
    ) -> Result<String, LLMError> {
        Err(LLMError::Api {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// Sleeps before answering.
#[derive(Debug)]
pub struct SlowLLM {
    delay: Duration,
    reply: String,
}

impl SlowLLM {
    pub fn new(delay: Duration, reply: &str) -> Self {
        Self {
            delay,
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl BaseLLM for SlowLLM {
    fn model(&self) -> &str {
        "slow"
    }

    async fn acall(
        &self,
        _messages: &[LLMMessage],
        _params: &GenerationParams,
    ) -> Result<String, LLMError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Always fails.
#[derive(Debug)]
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingService for FailingEmbedding {
    fn model(&self) -> &str {
        "hashing-256"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 500,
            body: "embedding backend down".to_string(),
        })
    }
}

/// Hashing embedder behind a delay.
#[derive(Debug)]
pub struct SlowEmbedding {
    delay: Duration,
    inner: HashingEmbedding,
}

impl SlowEmbedding {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: HashingEmbedding::default(),
        }
    }
}

#[async_trait]
impl EmbeddingService for SlowEmbedding {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.embed_sync(text))
    }
}
