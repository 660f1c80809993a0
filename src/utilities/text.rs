//! Text helpers shared by scoring, generation, and the repetition guard.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:'\p{L}+)?").unwrap());
static SENTENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+[\x22')\]]*").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Split text into lower-cased word tokens.
///
/// Apostrophes inside a word are kept so that "don't" and "can't" survive
/// as single tokens. Curly apostrophes are folded to ASCII first.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    WORD_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lower-cased word set of a text.
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of the word sets of two texts.
///
/// Two texts without any word have similarity 0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

/// Stable 64-bit hash of a text.
///
/// Derived from SHA-256 so the value does not change between processes,
/// platforms, or compiler versions.
pub fn stable_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Hex SHA-256 digest of a text.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Split text into sentences, keeping terminal punctuation.
///
/// A trailing fragment without terminal punctuation is returned as the
/// last element.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut consumed = 0;
    for m in SENTENCE_PATTERN.find_iter(text) {
        let sentence = m.as_str().trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        consumed = m.end();
    }
    let rest = text[consumed..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Drop a trailing incomplete sentence.
///
/// Text is cut after the last terminal punctuation mark. Text that has no
/// terminal punctuation at all is returned trimmed but otherwise intact,
/// since there is no complete sentence to fall back to.
pub fn trim_incomplete_sentence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.rfind(&['.', '!', '?'][..]) {
        Some(pos) => {
            let mut end = pos + 1;
            // keep a closing quote or bracket right after the punctuation
            for c in trimmed[end..].chars() {
                if matches!(c, '"' | '\'' | ')' | ']') {
                    end += c.len_utf8();
                } else {
                    break;
                }
            }
            trimmed[..end].to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_contractions() {
        let tokens = tokenize("I DON'T understand, really!");
        assert_eq!(tokens, vec!["i", "don't", "understand", "really"]);
    }

    #[test]
    fn test_tokenize_folds_curly_apostrophe() {
        assert_eq!(tokenize("can\u{2019}t"), vec!["can't"]);
    }

    #[test]
    fn test_tokenize_keeps_accented_words() {
        assert_eq!(tokenize("Café au lait, naïve Zoë!"), vec!["café", "au", "lait", "naïve", "zoë"]);
        assert!((jaccard_similarity("un café", "un cafe") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert_eq!(jaccard_similarity("hello there", "There hello"), 1.0);
        assert_eq!(jaccard_similarity("hello", "goodbye"), 0.0);
        assert_eq!(jaccard_similarity("", ""), 0.0);
    }

    #[test]
    fn test_jaccard_partial() {
        // {a, b, c} vs {b, c, d}: 2 / 4
        assert!((jaccard_similarity("a b c", "b c d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stable_hash_is_stable() {
        assert_eq!(stable_hash("margaret"), stable_hash("margaret"));
        assert_ne!(stable_hash("margaret"), stable_hash("robert"));
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("Hello there. How are you? I am fine");
        assert_eq!(s, vec!["Hello there.", "How are you?", "I am fine"]);
    }

    #[test]
    fn test_trim_incomplete_sentence() {
        assert_eq!(
            trim_incomplete_sentence("I'm fine, dear. I was just thinking about"),
            "I'm fine, dear."
        );
        assert_eq!(trim_incomplete_sentence("No punctuation here"), "No punctuation here");
        assert_eq!(trim_incomplete_sentence("She said \"hello.\" and"), "She said \"hello.\"");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\n b\tc "), "a b c");
    }
}
