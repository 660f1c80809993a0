//! Bounded per-persona conversation memory.
//!
//! Two FIFO buffers are kept: raw [`ConversationTurn`]s used to build
//! retrieval queries and topic summaries, and short display strings
//! ("Caregiver: ...", "Margaret: ...") reported back with each response.
//! Both are trimmed from the oldest end.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::output::PersonaEmotion;
use crate::utilities::text::truncate_chars;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caregiver,
    Persona,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Caregiver => f.write_str("caregiver"),
            Speaker::Persona => f.write_str("persona"),
        }
    }
}

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl ConversationTurn {
    pub fn caregiver(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Caregiver,
            text: text.into(),
            timestamp: Utc::now(),
            emotion: None,
        }
    }

    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Persona,
            text: text.into(),
            timestamp: Utc::now(),
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }
}

/// Mood and bounded history of one persona.
#[derive(Debug, Clone)]
pub struct PersonaMemory {
    turns: VecDeque<ConversationTurn>,
    context: VecDeque<String>,
    turn_cap: usize,
    context_cap: usize,
    mood: PersonaEmotion,
}

impl PersonaMemory {
    pub fn new(turn_cap: usize, context_cap: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(turn_cap),
            context: VecDeque::with_capacity(context_cap),
            turn_cap: turn_cap.max(1),
            context_cap: context_cap.max(1),
            mood: PersonaEmotion::Neutral,
        }
    }

    /// Append a raw turn, evicting the oldest beyond the cap.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.turn_cap {
            self.turns.pop_front();
        }
    }

    /// Append a display entry, evicting the oldest beyond the cap.
    pub fn push_context(&mut self, entry: impl Into<String>) {
        self.context.push_back(entry.into());
        while self.context.len() > self.context_cap {
            self.context.pop_front();
        }
    }

    /// The last `n` raw turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// The last `n` display entries, oldest first.
    pub fn recent_context(&self, n: usize) -> Vec<String> {
        let skip = self.context.len().saturating_sub(n);
        self.context.iter().skip(skip).cloned().collect()
    }

    /// Short summaries of the last `n` caregiver utterances.
    pub fn recent_topics(&self, n: usize) -> Vec<String> {
        let mut topics: Vec<String> = self
            .turns
            .iter()
            .rev()
            .filter(|t| t.speaker == Speaker::Caregiver)
            .take(n)
            .map(|t| truncate_chars(&t.text, 50))
            .collect();
        topics.reverse();
        topics
    }

    /// Clear history and set mood back to neutral.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.context.clear();
        self.mood = PersonaEmotion::Neutral;
    }

    pub fn mood(&self) -> PersonaEmotion {
        self.mood
    }

    pub fn set_mood(&mut self, mood: PersonaEmotion) {
        self.mood = mood;
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }
}

impl Default for PersonaMemory {
    fn default() -> Self {
        Self::new(10, 20)
    }
}
