//! Dialogue corpus loading.
//!
//! The corpus source is a JSONL file of [`CorpusRecord`]s. When it is absent
//! the hand-authored [`sample_corpus`] stands in, so retrieval still has
//! something persona-relevant to ground on.

use std::path::Path;

use crate::error::CorpusError;

use super::types::CorpusRecord;

const SAMPLE_DIALOGUE: &[(&str, &str)] = &[
    // dementia
    ("caregiver", "Hello Margaret, how are you feeling today? I'm here to help you with anything you need."),
    ("elder", "I'm doing okay, thank you for asking. Sometimes I get a bit confused though, especially with my medication."),
    ("caregiver", "I understand that must be difficult for you. Can you tell me more about what confuses you about your medication?"),
    ("elder", "Well, I sometimes forget where I put things, and I get worried about my family. I don't want to be a burden."),
    ("caregiver", "You're not a burden at all, Margaret. You're important to us. Let's work together to make things easier for you."),
    ("caregiver", "Have you taken your medication today? Let me help you check your pill organizer."),
    ("elder", "I think so, but I'm not sure. I get confused about the timing. Thank you for helping me remember."),
    ("caregiver", "Margaret, I notice you seem worried. What's on your mind today?"),
    ("elder", "I can't remember if my daughter called yesterday or last week. My memory isn't what it used to be."),
    ("caregiver", "That must be frustrating. Would you like me to help you call her? There's no rush."),
    // diabetes
    ("caregiver", "Robert, how are your blood sugar levels today? Have you been monitoring them regularly?"),
    ("elder", "I've been trying to check them, but sometimes I forget. My vision gets blurry when my blood sugar is high."),
    ("caregiver", "I understand it can be challenging to remember everything with diabetes. What signs do you usually notice when your levels are high?"),
    ("elder", "Well, I get thirsty a lot and need to use the bathroom more often. My blood sugar makes me feel tired too."),
    ("caregiver", "Those are good signs to watch for, Robert. Would you mind checking your levels now? It helps me make sure you're okay."),
    ("caregiver", "Robert, I noticed you haven't eaten much today. How are you feeling about your meals?"),
    ("elder", "I just don't feel like eating sometimes. Food doesn't taste the same since the diabetes."),
    ("caregiver", "I can understand that must be frustrating, Robert. Are there any foods that still taste good to you?"),
    ("elder", "Robert here still likes soup, especially chicken soup. Reminds me of when my wife used to make it."),
    ("caregiver", "That sounds wonderful, Robert. Maybe we could arrange for you to have soup more often."),
    // mobility
    ("caregiver", "Eleanor, I notice you're using your walker today. How are you managing with it?"),
    ("elder", "It's frustrating sometimes. I used to be so independent. Now I need this walker to get around safely."),
    ("caregiver", "Eleanor, you're still very independent. You're using tools that help you stay safe."),
    ("elder", "I suppose you're right. I just worry about falling and being a burden to my family."),
    ("caregiver", "Your safety is important, Eleanor, and using your walker shows you're taking good care of yourself."),
    ("caregiver", "Eleanor, I see you seem hesitant about going to the community center. What's been on your mind?"),
    ("elder", "I'm afraid of falling in front of everyone. What if I can't keep up with the activities?"),
    ("caregiver", "Those are understandable concerns, Eleanor. What activities did you enjoy most at the center?"),
    ("elder", "I loved the book club and the gentle exercise class, but with the walker I feel so slow compared to everyone else."),
    ("caregiver", "Many people there have similar concerns about falling. Your participation is valuable regardless of pace."),
    // general
    ("caregiver", "I understand this must be difficult for you. How can I best support you today?"),
    ("elder", "Thank you for being so patient with me. It means a lot to have someone who understands."),
    ("caregiver", "Let's take this one step at a time. There's no need to rush through anything."),
    ("caregiver", "You're doing great. It's okay to ask for help when you need it."),
    ("caregiver", "I'm here to listen. Please tell me what's most important to you right now."),
    ("caregiver", "Your feelings are completely valid. It's normal to feel frustrated sometimes."),
    ("caregiver", "I appreciate you sharing that with me. It helps me understand how to better support you."),
    ("caregiver", "We'll work together on this. You don't have to face these challenges alone."),
];

const SAMPLE_EMOTIONS: &[&str] = &[
    "empathetic",
    "patient",
    "understanding",
    "encouraging",
    "concerned",
    "supportive",
];

/// Persona and condition tags inferred from the content of a line.
fn infer_tags(text: &str) -> (&'static str, &'static str) {
    let lowered = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["margaret", "confused", "memory"]) {
        ("margaret", "dementia")
    } else if has(&["robert", "blood sugar", "diabetes"]) {
        ("robert", "diabetes")
    } else if has(&["eleanor", "walker", "falling"]) {
        ("eleanor", "mobility")
    } else {
        ("general", "general")
    }
}

/// Built-in persona-tagged example dialogue.
pub fn sample_corpus() -> Vec<CorpusRecord> {
    SAMPLE_DIALOGUE
        .iter()
        .enumerate()
        .map(|(i, (speaker, text))| {
            let (persona, condition) = infer_tags(text);
            CorpusRecord::new(*text)
                .with_speaker(*speaker)
                .with_persona(persona, condition)
                .with_emotion(SAMPLE_EMOTIONS[i % SAMPLE_EMOTIONS.len()])
                .with_source("sample_data")
        })
        .collect()
}

/// Parse JSONL corpus text. Blank lines are skipped.
pub fn parse_jsonl(content: &str) -> Result<Vec<CorpusRecord>, CorpusError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| CorpusError::InvalidRecord {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Load a JSONL corpus file.
pub fn load_jsonl(path: &Path) -> Result<Vec<CorpusRecord>, CorpusError> {
    let content = std::fs::read_to_string(path)?;
    parse_jsonl(&content)
}

/// Load the configured corpus, substituting the sample corpus when the file
/// is unset, missing, unreadable, or empty.
pub fn load_or_sample(path: Option<&Path>) -> Vec<CorpusRecord> {
    let Some(path) = path else {
        log::info!("No corpus configured, using sample corpus");
        return sample_corpus();
    };

    match load_jsonl(path) {
        Ok(records) if !records.is_empty() => {
            log::info!("Loaded {} corpus records from {}", records.len(), path.display());
            records
        }
        Ok(_) => {
            log::warn!("Corpus {} is empty, using sample corpus", path.display());
            sample_corpus()
        }
        Err(e) => {
            log::warn!(
                "Failed to load corpus {}: {}. Using sample corpus",
                path.display(),
                e
            );
            sample_corpus()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sample_corpus_is_tagged() {
        let corpus = sample_corpus();
        assert_eq!(corpus.len(), SAMPLE_DIALOGUE.len());
        for persona in ["margaret", "robert", "eleanor", "general"] {
            assert!(corpus.iter().any(|r| r.persona == persona), "{}", persona);
        }
        assert_eq!(corpus[0].persona, "margaret");
        assert_eq!(corpus[0].condition, "dementia");
        assert_eq!(corpus[0].emotion.as_deref(), Some("empathetic"));
        assert_eq!(corpus[6].emotion.as_deref(), Some("empathetic"));
        assert!(corpus.iter().all(|r| r.source == "sample_data"));
    }

    #[test]
    fn test_infer_tags_priority() {
        assert_eq!(infer_tags("Robert seems confused"), ("margaret", "dementia"));
        assert_eq!(infer_tags("My walker is new"), ("eleanor", "mobility"));
        assert_eq!(infer_tags("Nice weather"), ("general", "general"));
    }

    #[test]
    fn test_parse_jsonl_reports_line() {
        let content = "{\"text\": \"a\"}\n\n{not json}\n";
        match parse_jsonl(content) {
            Err(CorpusError::InvalidRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_or_sample_fallbacks() {
        assert_eq!(load_or_sample(None).len(), SAMPLE_DIALOGUE.len());
        assert_eq!(
            load_or_sample(Some(Path::new("/nonexistent/corpus.jsonl"))).len(),
            SAMPLE_DIALOGUE.len()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"speaker": "elder", "text": "I like tea.", "persona": "margaret", "condition": "dementia"}}"#
        )
        .unwrap();
        let records = load_or_sample(Some(file.path()));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].speaker, "elder");
        assert_eq!(records[0].persona, "margaret");
    }
}
