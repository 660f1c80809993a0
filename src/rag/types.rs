//! Record and chunk types for the retrieval index.

use serde::{Deserialize, Serialize};

use crate::utilities::text::sha256_hex;

fn default_tag() -> String {
    "general".to_string()
}

fn default_source() -> String {
    "corpus".to_string()
}

/// One line of example dialogue from the corpus source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    /// "caregiver" or "elder", free-form.
    #[serde(default)]
    pub speaker: String,
    pub text: String,
    /// Persona id the line belongs to, or "general".
    #[serde(default = "default_tag")]
    pub persona: String,
    /// Condition tag ("dementia", "diabetes", "mobility", "general").
    #[serde(default = "default_tag")]
    pub condition: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

impl CorpusRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            speaker: String::new(),
            text: text.into(),
            persona: default_tag(),
            condition: default_tag(),
            emotion: None,
            source: default_source(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>, condition: impl Into<String>) -> Self {
        self.persona = persona.into();
        self.condition = condition.into();
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub persona: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    pub source: String,
    /// Position of the source record in the corpus.
    pub record_index: usize,
    /// Position of the chunk within its record.
    pub chunk_index: usize,
}

/// An immutable window of corpus text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content hash plus position, stable across rebuilds of the same corpus.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: String, metadata: ChunkMetadata) -> Self {
        let digest = sha256_hex(&text);
        let id = format!(
            "{}-{}-{}",
            &digest[..16],
            metadata.record_index,
            metadata.chunk_index
        );
        Self { id, text, metadata }
    }

    /// Whether the chunk may ground a reply for `persona_id`.
    pub fn applies_to(&self, persona_id: &str) -> bool {
        self.metadata.persona == "general" || self.metadata.persona.eq_ignore_ascii_case(persona_id)
    }
}

/// A chunk returned by a query, with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f64,
}
