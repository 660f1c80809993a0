//! Reply generation as an ordered strategy chain.
//!
//! [`ResponseGenerator::generate`] tries each [`GenerationStrategy`] in
//! turn under a deadline and accepts the first candidate that is non-empty
//! and mentions no symptom from another condition's whitelist. Any failure
//! (service error, timeout, short or ungrounded output) moves on to the next
//! strategy. When the chain runs dry the caller substitutes
//! [`fallback::fallback_line`].

pub mod fallback;
pub mod prompt;
pub mod strategies;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::emotion::output::PersonaEmotion;
use crate::emotion::EmotionLabel;
use crate::error::{GenerationError, LLMError};
use crate::llms::base_llm::{BaseLLM, GenerationParams};
use crate::llms::providers::{OllamaCompletion, OpenAICompatibleCompletion};
use crate::persona::memory::ConversationTurn;
use crate::persona::profile::{Difficulty, PersonaProfile};
use crate::rag::types::ScoredChunk;
use crate::symptoms::SymptomAnchor;

pub use fallback::fallback_line;
pub use prompt::PromptBuilder;
pub use strategies::{
    AdapterStrategy, Candidate, GenerationStrategy, PlainStrategy, RetrievalAugmentedStrategy,
};

// ---------------------------------------------------------------------------
// StrategyKind
// ---------------------------------------------------------------------------

/// Which link of the chain produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Adapter,
    RetrievalAugmented,
    Plain,
    Fallback,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Adapter => "adapter",
            StrategyKind::RetrievalAugmented => "retrieval_augmented",
            StrategyKind::Plain => "plain",
            StrategyKind::Fallback => "fallback",
        }
    }

    /// Confidence reported for replies from this strategy.
    pub fn base_confidence(&self) -> f64 {
        match self {
            StrategyKind::Adapter => 0.9,
            StrategyKind::RetrievalAugmented => 0.85,
            StrategyKind::Plain => 0.75,
            StrategyKind::Fallback => 0.3,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GenerationContext
// ---------------------------------------------------------------------------

/// Everything a strategy may read for one turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub profile: &'a PersonaProfile,
    pub mood: PersonaEmotion,
    pub utterance: &'a str,
    pub history: &'a [ConversationTurn],
    pub symptoms: &'a [String],
    pub caregiver_emotion: EmotionLabel,
    pub difficulty: Difficulty,
    pub recent_topics: &'a [String],
    pub chunks: &'a [ScoredChunk],
}

/// An accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub text: String,
    pub strategy: StrategyKind,
    /// Retrieved chunks that reached the prompt. Empty unless the
    /// retrieval-augmented strategy produced the reply.
    pub chunks: Vec<ScoredChunk>,
}

impl GeneratedReply {
    /// The in-character apology used when every strategy failed.
    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            strategy: StrategyKind::Fallback,
            chunks: Vec::new(),
        }
    }

    pub fn is_grounded(&self) -> bool {
        !self.chunks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ResponseGenerator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ResponseGenerator {
    strategies: Vec<Box<dyn GenerationStrategy>>,
    symptoms: Arc<SymptomAnchor>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(
        strategies: Vec<Box<dyn GenerationStrategy>>,
        symptoms: Arc<SymptomAnchor>,
        timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            symptoms,
            timeout,
        }
    }

    /// Standard chain: adapter (when given), retrieval-augmented, plain.
    pub fn standard(
        config: &GenerationConfig,
        base: Arc<dyn BaseLLM>,
        adapter: Option<Arc<dyn BaseLLM>>,
        prompt_chunks: usize,
        symptoms: Arc<SymptomAnchor>,
    ) -> Result<Self, GenerationError> {
        let prompts = Arc::new(PromptBuilder::new(config.history_turns)?);
        let params = GenerationParams::from(config);

        let mut strategies: Vec<Box<dyn GenerationStrategy>> = Vec::with_capacity(3);
        if let Some(adapter) = adapter {
            strategies.push(Box::new(AdapterStrategy::new(
                adapter,
                Arc::clone(&prompts),
                params.clone(),
                config.min_adapter_chars,
            )));
        }
        strategies.push(Box::new(RetrievalAugmentedStrategy::new(
            Arc::clone(&base),
            Arc::clone(&prompts),
            params.clone(),
            prompt_chunks,
        )));
        strategies.push(Box::new(PlainStrategy::new(base, prompts, params)));

        Ok(Self::new(
            strategies,
            symptoms,
            Duration::from_millis(config.timeout_ms),
        ))
    }

    /// Build the standard chain from configuration, creating HTTP clients.
    pub fn from_config(
        config: &GenerationConfig,
        prompt_chunks: usize,
        symptoms: Arc<SymptomAnchor>,
    ) -> Result<Self, GenerationError> {
        let base = base_client(config)?;
        let adapter = adapter_client(config)?;
        Self::standard(config, base, adapter, prompt_chunks, symptoms)
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run the chain until a candidate is accepted.
    pub async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> Result<GeneratedReply, GenerationError> {
        for strategy in &self.strategies {
            let kind = strategy.kind();
            match self.run(strategy.as_ref(), ctx).await {
                Ok(candidate) => {
                    log::debug!(
                        "Strategy '{}' produced {} chars from {} chunks",
                        kind,
                        candidate.text.chars().count(),
                        candidate.chunks_used
                    );
                    let used = candidate.chunks_used.min(ctx.chunks.len());
                    return Ok(GeneratedReply {
                        text: candidate.text,
                        strategy: kind,
                        chunks: ctx.chunks[..used].to_vec(),
                    });
                }
                Err(GenerationError::NoGrounding) => {
                    log::debug!("Strategy '{}' skipped: no retrieved context", kind);
                }
                Err(e) => {
                    log::warn!("Strategy '{}' failed: {}", kind, e);
                }
            }
        }
        Err(GenerationError::AllStrategiesExhausted)
    }

    async fn run(
        &self,
        strategy: &dyn GenerationStrategy,
        ctx: &GenerationContext<'_>,
    ) -> Result<Candidate, GenerationError> {
        let name = strategy.kind().as_str();
        let candidate = tokio::time::timeout(self.timeout, strategy.attempt(ctx))
            .await
            .map_err(|_| GenerationError::Timeout {
                strategy: name,
                millis: self.timeout.as_millis() as u64,
            })??;

        let text = candidate.text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::InsufficientOutput {
                strategy: name,
                chars: 0,
            });
        }
        if let Some(symptom) = self.symptoms.find_foreign_claim(&text, &ctx.profile.condition) {
            return Err(GenerationError::Ungrounded {
                strategy: name,
                symptom,
            });
        }
        Ok(Candidate { text, ..candidate })
    }
}

/// Ollama client for the base model.
pub fn base_client(config: &GenerationConfig) -> Result<Arc<dyn BaseLLM>, LLMError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    Ok(Arc::new(
        OllamaCompletion::with_timeout(&config.base_url, &config.model, timeout)?
            .max_retries(config.max_retries),
    ))
}

/// Client for the adapter model, when one is configured.
pub fn adapter_client(config: &GenerationConfig) -> Result<Option<Arc<dyn BaseLLM>>, LLMError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let Some(model) = config.adapter_model.as_deref() else {
        return Ok(None);
    };
    let client: Arc<dyn BaseLLM> = match config.adapter_url.as_deref() {
        Some(url) => Arc::new(
            OpenAICompatibleCompletion::new(url, model, timeout)?.max_retries(config.max_retries),
        ),
        // adapter merged into a local Ollama model
        None => Arc::new(
            OllamaCompletion::with_timeout(&config.base_url, model, timeout)?
                .max_retries(config.max_retries),
        ),
    };
    log::info!("Adapter strategy enabled with model '{}'", model);
    Ok(Some(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::profile::default_roster;
    use crate::rag::types::{Chunk, ChunkMetadata};
    use crate::testing::{FailingLLM, ScriptedLLM, SlowLLM};

    fn chunk() -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(
                "I forget where I put things.".into(),
                ChunkMetadata {
                    persona: "margaret".into(),
                    condition: "dementia".into(),
                    emotion: None,
                    source: "test".into(),
                    record_index: 0,
                    chunk_index: 0,
                },
            ),
            similarity: 0.7,
        }
    }

    fn generator(
        base: Arc<dyn BaseLLM>,
        adapter: Option<Arc<dyn BaseLLM>>,
        timeout_ms: u64,
    ) -> ResponseGenerator {
        let config = GenerationConfig {
            timeout_ms,
            ..GenerationConfig::default()
        };
        ResponseGenerator::standard(&config, base, adapter, 3, Arc::new(SymptomAnchor::builtin()))
            .unwrap()
    }

    fn ctx<'a>(profile: &'a PersonaProfile, chunks: &'a [ScoredChunk]) -> GenerationContext<'a> {
        GenerationContext {
            profile,
            mood: PersonaEmotion::Neutral,
            utterance: "How are you feeling today?",
            history: &[],
            symptoms: &[],
            caregiver_emotion: EmotionLabel::Neutral,
            difficulty: Difficulty::Beginner,
            recent_topics: &[],
            chunks,
        }
    }

    #[tokio::test]
    async fn test_chain_order() {
        let g = generator(
            Arc::new(ScriptedLLM::repeating("x")),
            Some(Arc::new(ScriptedLLM::repeating("y"))),
            1000,
        );
        assert_eq!(
            g.strategy_kinds(),
            vec![
                StrategyKind::Adapter,
                StrategyKind::RetrievalAugmented,
                StrategyKind::Plain
            ]
        );
    }

    #[tokio::test]
    async fn test_adapter_wins_when_available() {
        let roster = default_roster();
        let g = generator(
            Arc::new(ScriptedLLM::repeating("From the base model, dear.")),
            Some(Arc::new(ScriptedLLM::repeating("From the adapter, dear."))),
            1000,
        );
        let chunks = vec![chunk()];
        let reply = g.generate(&ctx(&roster[0], &chunks)).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::Adapter);
        assert_eq!(reply.text, "From the adapter, dear.");
        assert!(!reply.is_grounded());
    }

    #[tokio::test]
    async fn test_failing_adapter_falls_through_to_rag() {
        let roster = default_roster();
        let g = generator(
            Arc::new(ScriptedLLM::repeating("I'm doing alright today.")),
            Some(Arc::new(FailingLLM)),
            1000,
        );
        let chunks = vec![chunk()];
        let reply = g.generate(&ctx(&roster[0], &chunks)).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::RetrievalAugmented);
        assert_eq!(reply.chunks, chunks);
    }

    #[tokio::test]
    async fn test_rag_reply_reports_prompt_chunks_only() {
        let roster = default_roster();
        let g = generator(Arc::new(ScriptedLLM::repeating("I'm doing alright today.")), None, 1000);
        let chunks = vec![chunk(); 5];
        let reply = g.generate(&ctx(&roster[0], &chunks)).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::RetrievalAugmented);
        assert_eq!(reply.chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_no_chunks_uses_plain() {
        let roster = default_roster();
        let g = generator(Arc::new(ScriptedLLM::repeating("I'm doing alright today.")), None, 1000);
        let reply = g.generate(&ctx(&roster[0], &[])).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::Plain);
    }

    #[tokio::test]
    async fn test_all_failing_is_exhausted() {
        let roster = default_roster();
        let g = generator(Arc::new(FailingLLM), Some(Arc::new(FailingLLM)), 1000);
        let chunks = vec![chunk()];
        let err = g.generate(&ctx(&roster[0], &chunks)).await.unwrap_err();
        assert!(matches!(err, GenerationError::AllStrategiesExhausted));
    }

    #[tokio::test]
    async fn test_timeout_advances_chain() {
        let roster = default_roster();
        let g = generator(
            Arc::new(ScriptedLLM::repeating("I'm doing alright today.")),
            Some(Arc::new(SlowLLM::new(Duration::from_secs(5), "too late"))),
            50,
        );
        let reply = g.generate(&ctx(&roster[0], &[])).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::Plain);
    }

    #[tokio::test]
    async fn test_empty_output_advances_chain() {
        let roster = default_roster();
        let base = Arc::new(ScriptedLLM::sequence(vec!["   ", "Second try worked."]));
        let g = generator(base, None, 1000);
        let chunks = vec![chunk()];
        let reply = g.generate(&ctx(&roster[0], &chunks)).await.unwrap();
        assert_eq!(reply.strategy, StrategyKind::Plain);
        assert_eq!(reply.text, "Second try worked.");
        // chunks were retrieved but the accepted reply never saw them
        assert!(reply.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_symptom_is_rejected() {
        let roster = default_roster();
        // margaret (dementia) must not claim a diabetes symptom
        let base = Arc::new(ScriptedLLM::sequence(vec![
            "My blurred vision is terrible today.",
            "I keep losing my glasses, dear.",
        ]));
        let g = generator(base, None, 1000);
        let chunks = vec![chunk()];
        let reply = g.generate(&ctx(&roster[0], &chunks)).await.unwrap();
        assert_eq!(reply.text, "I keep losing my glasses, dear.");
        assert_eq!(reply.strategy, StrategyKind::Plain);
    }

    #[test]
    fn test_fallback_reply_is_ungrounded() {
        let reply = GeneratedReply::fallback("I'm sorry, dear.");
        assert_eq!(reply.strategy, StrategyKind::Fallback);
        assert!(!reply.is_grounded());
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(StrategyKind::Adapter.base_confidence() > StrategyKind::Plain.base_confidence());
        assert!(StrategyKind::Plain.base_confidence() > StrategyKind::Fallback.base_confidence());
    }
}
