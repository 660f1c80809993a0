//! The three generation strategies, in chain order.
//!
//! Each strategy makes at most one completion call and either returns raw
//! candidate text or says why it could not. Validation shared by all of them
//! (empty output, foreign symptoms) happens in the generator.

use std::sync::Arc;

use async_trait::async_trait;

use super::prompt::PromptBuilder;
use super::{GenerationContext, StrategyKind};
use crate::error::GenerationError;
use crate::llms::base_llm::{BaseLLM, GenerationParams, LLMMessage};
use crate::utilities::text::trim_incomplete_sentence;

/// Raw output of one strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    /// Leading chunks of the context that were placed into the prompt.
    pub chunks_used: usize,
}

impl Candidate {
    pub fn ungrounded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chunks_used: 0,
        }
    }

    pub fn grounded(text: impl Into<String>, chunks_used: usize) -> Self {
        Self {
            text: text.into(),
            chunks_used,
        }
    }
}

/// One way of producing a candidate reply.
#[async_trait]
pub trait GenerationStrategy: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> StrategyKind;

    /// Attempt generation. Errors advance the chain.
    async fn attempt(&self, ctx: &GenerationContext<'_>) -> Result<Candidate, GenerationError>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Domain-tuned adapter called with a compact prompt.
#[derive(Debug)]
pub struct AdapterStrategy {
    llm: Arc<dyn BaseLLM>,
    prompts: Arc<PromptBuilder>,
    params: GenerationParams,
    min_chars: usize,
}

impl AdapterStrategy {
    pub fn new(
        llm: Arc<dyn BaseLLM>,
        prompts: Arc<PromptBuilder>,
        params: GenerationParams,
        min_chars: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            params,
            min_chars,
        }
    }
}

#[async_trait]
impl GenerationStrategy for AdapterStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adapter
    }

    async fn attempt(&self, ctx: &GenerationContext<'_>) -> Result<Candidate, GenerationError> {
        let prompt = self.prompts.adapter_prompt(ctx)?;
        let messages = vec![LLMMessage::system(prompt), LLMMessage::user(ctx.utterance)];
        let raw = self.llm.acall(&messages, &self.params).await?;

        let text = trim_incomplete_sentence(&raw);
        let chars = text.chars().count();
        if chars <= self.min_chars {
            return Err(GenerationError::InsufficientOutput {
                strategy: self.kind().as_str(),
                chars,
            });
        }
        Ok(Candidate::ungrounded(text))
    }
}

// ---------------------------------------------------------------------------
// Retrieval-augmented
// ---------------------------------------------------------------------------

/// Full persona prompt plus retrieved example chunks.
#[derive(Debug)]
pub struct RetrievalAugmentedStrategy {
    llm: Arc<dyn BaseLLM>,
    prompts: Arc<PromptBuilder>,
    params: GenerationParams,
    max_chunks: usize,
}

impl RetrievalAugmentedStrategy {
    pub fn new(
        llm: Arc<dyn BaseLLM>,
        prompts: Arc<PromptBuilder>,
        params: GenerationParams,
        max_chunks: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            params,
            max_chunks,
        }
    }
}

#[async_trait]
impl GenerationStrategy for RetrievalAugmentedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RetrievalAugmented
    }

    async fn attempt(&self, ctx: &GenerationContext<'_>) -> Result<Candidate, GenerationError> {
        if ctx.chunks.is_empty() {
            return Err(GenerationError::NoGrounding);
        }
        let used = &ctx.chunks[..ctx.chunks.len().min(self.max_chunks)];
        let system = self.prompts.system_prompt(ctx, used)?;
        let messages = self.prompts.messages(ctx, system);
        let text = self.llm.acall(&messages, &self.params).await?;
        Ok(Candidate::grounded(text, used.len()))
    }
}

// ---------------------------------------------------------------------------
// Plain
// ---------------------------------------------------------------------------

/// Full persona prompt without retrieved context.
#[derive(Debug)]
pub struct PlainStrategy {
    llm: Arc<dyn BaseLLM>,
    prompts: Arc<PromptBuilder>,
    params: GenerationParams,
}

impl PlainStrategy {
    pub fn new(llm: Arc<dyn BaseLLM>, prompts: Arc<PromptBuilder>, params: GenerationParams) -> Self {
        Self {
            llm,
            prompts,
            params,
        }
    }
}

#[async_trait]
impl GenerationStrategy for PlainStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Plain
    }

    async fn attempt(&self, ctx: &GenerationContext<'_>) -> Result<Candidate, GenerationError> {
        let system = self.prompts.system_prompt(ctx, &[])?;
        let messages = self.prompts.messages(ctx, system);
        let text = self.llm.acall(&messages, &self.params).await?;
        Ok(Candidate::ungrounded(text))
    }
}
