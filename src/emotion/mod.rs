//! Caregiver emotion scoring.
//!
//! Scores free text against fixed keyword families and picks one dominant
//! label. Every keyword hit is weighted:
//!
//! - base weight is the keyword's token count, so "don't understand"
//!   outweighs "lost";
//! - an intensifier immediately before the keyword scales it up;
//! - a negation within the preceding window scales it down (the label is
//!   kept, only its confidence drops);
//! - a question mark anywhere in the text scales every hit down.
//!
//! The multipliers and the significance threshold come from
//! [`EmotionWeights`]. Keyword tables are built once on first use.

pub mod output;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::EmotionWeights;
use crate::utilities::text::tokenize;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Emotion families detected in caregiver input, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Confused,
    Frustrated,
    Worried,
    Sad,
    Calm,
    Excited,
    Neutral,
}

impl EmotionLabel {
    /// All labels in declaration order.
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Happy,
        EmotionLabel::Confused,
        EmotionLabel::Frustrated,
        EmotionLabel::Worried,
        EmotionLabel::Sad,
        EmotionLabel::Calm,
        EmotionLabel::Excited,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Confused => "confused",
            EmotionLabel::Frustrated => "frustrated",
            EmotionLabel::Worried => "worried",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Excited => "excited",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Whether the family expresses a positive affect.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            EmotionLabel::Happy | EmotionLabel::Calm | EmotionLabel::Excited
        )
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        EmotionLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == lowered)
            .ok_or_else(|| format!("Unknown emotion label: {}", s))
    }
}

// ---------------------------------------------------------------------------
// Keyword tables
// ---------------------------------------------------------------------------

const INTENSIFIERS: &[&str] = &["very", "extremely", "really", "so", "quite"];

const NEGATIONS: &[&str] = &["not", "never", "no", "don't", "can't", "won't"];

const KEYWORDS: &[(EmotionLabel, &[&str])] = &[
    (
        EmotionLabel::Happy,
        &[
            "good", "great", "wonderful", "excellent", "amazing", "fantastic", "love", "enjoy",
            "pleased",
        ],
    ),
    (
        EmotionLabel::Confused,
        &[
            "confused",
            "don't understand",
            "not sure",
            "unclear",
            "puzzled",
            "lost",
            "bewildered",
        ],
    ),
    (
        EmotionLabel::Frustrated,
        &[
            "frustrated", "annoyed", "irritated", "upset", "angry", "mad", "bothered",
            "exasperated",
        ],
    ),
    (
        EmotionLabel::Worried,
        &[
            "worried", "concerned", "anxious", "nervous", "scared", "afraid", "uneasy", "troubled",
        ],
    ),
    (
        EmotionLabel::Sad,
        &[
            "sad", "depressed", "down", "blue", "miserable", "unhappy", "gloomy", "melancholy",
        ],
    ),
    (
        EmotionLabel::Calm,
        &[
            "calm", "peaceful", "relaxed", "serene", "tranquil", "composed", "collected", "steady",
        ],
    ),
    (
        EmotionLabel::Excited,
        &[
            "excited",
            "thrilled",
            "enthusiastic",
            "eager",
            "pumped",
            "energized",
            "animated",
        ],
    ),
    (
        EmotionLabel::Neutral,
        &["okay", "fine", "alright", "normal", "regular", "standard", "typical"],
    ),
];

/// Keyword families pre-tokenized into token sequences.
static KEYWORD_TABLE: Lazy<Vec<(EmotionLabel, Vec<Vec<String>>)>> = Lazy::new(|| {
    KEYWORDS
        .iter()
        .map(|(label, words)| (*label, words.iter().map(|w| tokenize(w)).collect()))
        .collect()
});

/// Find every start index where `needle` occurs as a token run in `tokens`.
pub(crate) fn find_sequence(tokens: &[String], needle: &[String]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > tokens.len() {
        return Vec::new();
    }
    tokens
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// EmotionScore
// ---------------------------------------------------------------------------

/// Per-family weights for one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionScore {
    weights: Vec<(EmotionLabel, f64)>,
}

impl EmotionScore {
    /// Accumulated weight for a label.
    pub fn weight(&self, label: EmotionLabel) -> f64 {
        self.weights
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Weights in declaration order.
    pub fn weights(&self) -> &[(EmotionLabel, f64)] {
        &self.weights
    }

    /// Highest-weighted label, or neutral below `threshold`.
    ///
    /// Ties keep the label declared first.
    pub fn dominant(&self, threshold: f64) -> EmotionLabel {
        let mut best: Option<(EmotionLabel, f64)> = None;
        for (label, weight) in &self.weights {
            match best {
                Some((_, w)) if *weight <= w => {}
                _ => best = Some((*label, *weight)),
            }
        }
        match best {
            Some((label, weight)) if weight >= threshold && weight > 0.0 => label,
            _ => EmotionLabel::Neutral,
        }
    }
}

// ---------------------------------------------------------------------------
// EmotionScorer
// ---------------------------------------------------------------------------

/// Weighted keyword scorer for caregiver utterances.
#[derive(Debug, Clone, Default)]
pub struct EmotionScorer {
    weights: EmotionWeights,
}

impl EmotionScorer {
    pub fn new(weights: EmotionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &EmotionWeights {
        &self.weights
    }

    /// Dominant emotion of `text`.
    pub fn score(&self, text: &str) -> EmotionLabel {
        let label = self
            .score_all(text)
            .dominant(self.weights.significance_threshold);
        log::debug!("Scored caregiver emotion '{}'", label);
        label
    }

    /// Weights of every family for `text`.
    pub fn score_all(&self, text: &str) -> EmotionScore {
        let tokens = tokenize(text);
        let question = text.contains('?');

        let weights = KEYWORD_TABLE
            .iter()
            .map(|(label, keywords)| {
                let total: f64 = keywords
                    .iter()
                    .flat_map(|kw| {
                        find_sequence(&tokens, kw)
                            .into_iter()
                            .map(move |start| (kw.len(), start))
                    })
                    .map(|(len, start)| self.hit_weight(&tokens, start, len, question))
                    .sum();
                (*label, total)
            })
            .collect();

        EmotionScore { weights }
    }

    fn hit_weight(&self, tokens: &[String], start: usize, len: usize, question: bool) -> f64 {
        let mut weight = len as f64;

        if start > 0 && INTENSIFIERS.contains(&tokens[start - 1].as_str()) {
            weight *= self.weights.intensifier_multiplier;
        }

        let window_start = start.saturating_sub(self.weights.negation_window);
        if tokens[window_start..start]
            .iter()
            .any(|t| NEGATIONS.contains(&t.as_str()))
        {
            weight *= self.weights.negation_multiplier;
        }

        if question {
            weight *= self.weights.question_multiplier;
        }

        weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> EmotionScorer {
        EmotionScorer::default()
    }

    #[test]
    fn test_plain_question_is_neutral() {
        assert_eq!(scorer().score("How are you feeling today?"), EmotionLabel::Neutral);
    }

    #[test]
    fn test_intensified_worry() {
        let s = scorer();
        let score = s.score_all("I'm really worried about my diabetes");
        assert!((score.weight(EmotionLabel::Worried) - 1.5).abs() < 1e-9);
        assert_eq!(s.score("I'm really worried about my diabetes"), EmotionLabel::Worried);
    }

    #[test]
    fn test_multi_word_keyword_has_higher_base() {
        let score = scorer().score_all("I don't understand");
        assert!((score.weight(EmotionLabel::Confused) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_negation_lowers_positive_weight() {
        let s = scorer();
        for (plain, negated, label) in [
            ("I feel great today", "I don't feel great today", EmotionLabel::Happy),
            ("it was wonderful", "it was not wonderful", EmotionLabel::Happy),
            ("I am calm", "I am never calm", EmotionLabel::Calm),
            ("we are excited", "we are no longer excited", EmotionLabel::Excited),
        ] {
            let a = s.score_all(plain).weight(label);
            let b = s.score_all(negated).weight(label);
            assert!(b < a, "{} vs {}: {} !< {}", negated, plain, b, a);
        }
    }

    #[test]
    fn test_negation_outside_window_is_ignored() {
        let score = scorer().score_all("no, I think the day went good");
        assert!((score.weight(EmotionLabel::Happy) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_question_scales_weight() {
        let score = scorer().score_all("Are you worried?");
        assert!((score.weight(EmotionLabel::Worried) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_is_neutral() {
        // 1.0 * 0.3 = 0.3 < 0.5
        assert_eq!(scorer().score("I'm not upset"), EmotionLabel::Neutral);
    }

    #[test]
    fn test_tie_breaks_by_declaration_order() {
        // happy and worried both score 1.0; happy is declared first
        assert_eq!(scorer().score("good but worried"), EmotionLabel::Happy);
    }

    #[test]
    fn test_repeated_keywords_accumulate() {
        let score = scorer().score_all("sad, so sad");
        assert!((score.weight(EmotionLabel::Sad) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_custom_weights() {
        let s = EmotionScorer::new(EmotionWeights {
            significance_threshold: 2.0,
            ..EmotionWeights::default()
        });
        assert_eq!(s.score("I am worried"), EmotionLabel::Neutral);
        assert_eq!(s.score("I am worried and anxious"), EmotionLabel::Worried);
    }

    #[test]
    fn test_label_parse_and_display() {
        assert_eq!("Worried".parse::<EmotionLabel>().unwrap(), EmotionLabel::Worried);
        assert!("elated".parse::<EmotionLabel>().is_err());
        assert_eq!(EmotionLabel::Frustrated.to_string(), "frustrated");
    }
}
