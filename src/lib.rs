//! # GerontoVoice
//!
//! Persona-grounded response pipeline for caregiver training. A caregiver
//! utterance goes in; a reply from a simulated elderly persona comes out,
//! grounded in that persona's condition, steered by retrieved example
//! dialogue, and kept from repeating itself.
//!
//! ```text
//! utterance ─▶ EmotionScorer ─▶ SymptomAnchor ─▶ Retriever ─▶ prompt
//!           ─▶ ResponseGenerator (adapter → retrieval-augmented → plain → apology)
//!           ─▶ OutputClassifier ─▶ RepetitionGuard ─▶ PersonaMemory ─▶ ResponseRecord
//! ```
//!
//! Start with [`ResponsePipeline::from_config`] or
//! [`ResponsePipeline::builder`].

pub mod config;
pub mod emotion;
pub mod error;
pub mod generation;
pub mod guardrails;
pub mod llms;
pub mod persona;
pub mod pipeline;
pub mod rag;
pub mod session;
pub mod symptoms;
pub mod utilities;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use emotion::output::{OutputClassifier, PersonaEmotion};
pub use emotion::{EmotionLabel, EmotionScorer};
pub use error::{PipelineError, SetupError};
pub use generation::{ResponseGenerator, StrategyKind};
pub use guardrails::RepetitionGuard;
pub use llms::base_llm::BaseLLM;
pub use persona::{ConversationTurn, Difficulty, PersonaProfile, Speaker};
pub use pipeline::{ResponsePipeline, ResponseRecord, TurnStage};
pub use rag::{EmbeddingService, Retriever};
pub use session::{ConversationStore, InMemoryConversationStore};
pub use symptoms::SymptomAnchor;
