//! Near-duplicate detection and deterministic rewording of persona replies.
//!
//! A candidate is repetitive when the Jaccard similarity of its word set to
//! any of the persona's last few replies reaches the threshold. Rewording is
//! a pure function of the candidate's [`stable_hash`] and the persona's
//! [`PersonaVoice`]: the same candidate always comes out the same way.

use std::collections::{HashMap, VecDeque};

use dashmap::DashMap;
use regex::{Captures, Regex};

use crate::config::RepetitionConfig;
use crate::persona::profile::{PersonaProfile, PersonaVoice};
use crate::utilities::text::{jaccard_similarity, split_sentences, stable_hash};

/// Per-persona cache of recent replies.
#[derive(Debug)]
pub struct RepetitionGuard {
    threshold: f64,
    window: usize,
    recent: DashMap<String, VecDeque<String>>,
    voices: HashMap<String, PersonaVoice>,
}

impl RepetitionGuard {
    pub fn new(config: &RepetitionConfig, profiles: &[PersonaProfile]) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window.max(1),
            recent: DashMap::new(),
            voices: profiles
                .iter()
                .map(|p| (p.id.clone(), p.voice.clone()))
                .collect(),
        }
    }

    /// Highest similarity of `candidate` to the persona's recent replies.
    pub fn max_similarity(&self, candidate: &str, persona_id: &str) -> f64 {
        self.recent
            .get(persona_id)
            .map(|outputs| {
                outputs
                    .iter()
                    .map(|prev| jaccard_similarity(candidate, prev))
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0)
    }

    pub fn is_repetitive(&self, candidate: &str, persona_id: &str) -> bool {
        self.max_similarity(candidate, persona_id) >= self.threshold
    }

    /// Reword `candidate` in the persona's voice.
    ///
    /// Unknown personas get the candidate back unchanged.
    pub fn vary(&self, candidate: &str, persona_id: &str) -> String {
        match self.voices.get(persona_id) {
            Some(voice) => vary_with_voice(candidate, voice),
            None => {
                log::warn!("No voice registered for persona '{}'", persona_id);
                candidate.to_string()
            }
        }
    }

    /// Remember a delivered reply, evicting the oldest beyond the window.
    pub fn record(&self, persona_id: &str, text: &str) {
        let mut outputs = self.recent.entry(persona_id.to_string()).or_default();
        outputs.push_back(text.to_string());
        while outputs.len() > self.window {
            outputs.pop_front();
        }
    }

    /// Forget everything recorded for the persona.
    pub fn reset(&self, persona_id: &str) {
        self.recent.remove(persona_id);
    }

    /// Recorded replies, oldest first.
    pub fn recent(&self, persona_id: &str) -> Vec<String> {
        self.recent
            .get(persona_id)
            .map(|outputs| outputs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Variation
// ---------------------------------------------------------------------------

/// Pure rewording of `candidate` using `voice`.
///
/// With `h = stable_hash(candidate)`:
/// - `h % 5 == 0` swaps the first and last sentences (multi-sentence only);
/// - `h % 4` picks starter, ender, both, or word substitutions;
/// - `h % 3 == 0` additionally applies substitutions;
/// - vocabulary entries are picked with `(h >> 8) % len`.
///
/// If none of that changed the text, a starter and then an ender are tried.
pub fn vary_with_voice(candidate: &str, voice: &PersonaVoice) -> String {
    let text = candidate.trim();
    let h = stable_hash(text);
    let starter = pick(&voice.starters, h);
    let ender = pick(&voice.enders, h);

    let mut out = if h % 5 == 0 {
        swap_first_last_sentence(text)
    } else {
        text.to_string()
    };

    out = match h % 4 {
        0 => apply_starter(&out, starter),
        1 => apply_ender(&out, ender),
        2 => apply_ender(&apply_starter(&out, starter), ender),
        _ => apply_substitutions(&out, &voice.substitutions),
    };
    if h % 3 == 0 && h % 4 != 3 {
        out = apply_substitutions(&out, &voice.substitutions);
    }

    if out == text {
        out = apply_starter(text, starter);
    }
    if out == text {
        out = apply_ender(text, ender);
    }
    out
}

fn pick(options: &[String], h: u64) -> Option<&str> {
    if options.is_empty() {
        return None;
    }
    Some(options[((h >> 8) % options.len() as u64) as usize].as_str())
}

fn apply_starter(text: &str, starter: Option<&str>) -> String {
    let Some(starter) = starter else {
        return text.to_string();
    };
    if text.to_lowercase().starts_with(&starter.to_lowercase()) {
        return text.to_string();
    }
    format!("{} {}", starter, lower_first(text))
}

fn apply_ender(text: &str, ender: Option<&str>) -> String {
    let Some(ender) = ender else {
        return text.to_string();
    };
    if text.ends_with(ender) {
        return text.to_string();
    }
    let body = text.trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',') || c.is_whitespace());
    if body.is_empty() {
        return text.to_string();
    }
    format!("{}{}", body, ender)
}

fn apply_substitutions(text: &str, substitutions: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (from, to) in substitutions {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(from));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        out = re
            .replace_all(&out, |caps: &Captures<'_>| match_case(&caps[0], to))
            .into_owned();
    }
    out
}

fn swap_first_last_sentence(text: &str) -> String {
    let mut sentences = split_sentences(text);
    if sentences.len() < 2 {
        return text.to_string();
    }
    let last = sentences.len() - 1;
    sentences.swap(0, last);
    sentences.join(" ")
}

/// Lowercase the first letter unless the text opens with "I" or "I'...".
fn lower_first(text: &str) -> String {
    let first_word = text.split_whitespace().next().unwrap_or("");
    if first_word == "I" || first_word.starts_with("I'") || first_word.starts_with("I\u{2019}") {
        return text.to_string();
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Capitalize `replacement` when `matched` starts with an upper-case letter.
fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
