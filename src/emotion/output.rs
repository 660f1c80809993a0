//! Emotion classification for generated persona replies.
//!
//! Unlike caregiver scoring this is an unweighted count: each keyword that
//! appears at least once adds one to its family. The winner becomes the
//! persona's mood.
//!
//! Keywords match as word prefixes, so "thank" also counts "thanks" and
//! "thankful", and "feel" counts "feeling".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utilities::text::tokenize;

/// Mood expressed by a persona reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaEmotion {
    Empathetic,
    Confused,
    Agitated,
    Sad,
    Encouraging,
    #[default]
    Neutral,
}

impl PersonaEmotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaEmotion::Empathetic => "empathetic",
            PersonaEmotion::Confused => "confused",
            PersonaEmotion::Agitated => "agitated",
            PersonaEmotion::Sad => "sad",
            PersonaEmotion::Encouraging => "encouraging",
            PersonaEmotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for PersonaEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const OUTPUT_KEYWORDS: &[(PersonaEmotion, &[&str])] = &[
    (
        PersonaEmotion::Empathetic,
        &["understand", "feel", "sorry", "care", "worried", "concerned"],
    ),
    (
        PersonaEmotion::Confused,
        &["confused", "don't know", "not sure", "forgot", "remember"],
    ),
    (
        PersonaEmotion::Agitated,
        &["angry", "frustrated", "upset", "annoyed", "don't want"],
    ),
    (
        PersonaEmotion::Sad,
        &["sad", "lonely", "miss", "scared", "worried", "afraid"],
    ),
    (
        PersonaEmotion::Encouraging,
        &["thank", "appreciate", "help", "good", "better", "try"],
    ),
];

/// Keyword-count classifier for persona output.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    table: Vec<(PersonaEmotion, Vec<Vec<String>>)>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        let table = OUTPUT_KEYWORDS
            .iter()
            .map(|(emotion, words)| (*emotion, words.iter().map(|w| tokenize(w)).collect()))
            .collect();
        Self { table }
    }

    /// Classify a persona reply. Neutral when nothing matches.
    pub fn classify(&self, text: &str) -> PersonaEmotion {
        let tokens = tokenize(text);
        let mut best = (PersonaEmotion::Neutral, 0usize);
        for (emotion, keywords) in &self.table {
            let count = keywords
                .iter()
                .filter(|kw| contains_prefixed(&tokens, kw))
                .count();
            if count > best.1 {
                best = (*emotion, count);
            }
        }
        best.0
    }
}

/// Whether `needle` occurs in `tokens` with each needle word matching the
/// start of the corresponding token.
fn contains_prefixed(tokens: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle)
            .all(|(token, word)| token.starts_with(word.as_str()))
    })
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}
