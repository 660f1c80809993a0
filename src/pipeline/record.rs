//! The immutable result of one turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::output::PersonaEmotion;
use crate::emotion::EmotionLabel;
use crate::generation::StrategyKind;
use crate::persona::profile::Difficulty;

/// Persona state as of the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaStateSnapshot {
    pub mood: PersonaEmotion,
    pub condition: String,
    /// Last display entries ("Caregiver: ...", "Margaret: ..."), oldest first.
    pub memory: Vec<String>,
}

/// Everything produced by [`ResponsePipeline::respond`](super::ResponsePipeline::respond).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub persona_id: String,
    pub text: String,
    pub persona_emotion: PersonaEmotion,
    pub caregiver_emotion: EmotionLabel,
    pub confidence: f64,
    /// Whether retrieved chunks were placed into the prompt that produced
    /// `text`. Always false for adapter, plain, and fallback replies.
    pub grounded: bool,
    /// Number of chunks in `chunks`.
    pub chunk_count: usize,
    /// Text of the chunks the accepted prompt was grounded on.
    pub chunks: Vec<String>,
    pub difficulty: Difficulty,
    pub strategy: StrategyKind,
    /// Whether the repetition guard reworded the reply.
    pub varied: bool,
    pub persona_state: PersonaStateSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn is_fallback(&self) -> bool {
        self.strategy == StrategyKind::Fallback
    }
}
