//! Persona profiles, voices, and training difficulty.
//!
//! A profile is the fixed identity of a simulated character. Its
//! [`PersonaVoice`] holds the in-character phrases used when a reply has to
//! be varied or replaced by an apology.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Training difficulty. Only changes prompt phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }

    /// Complexity guidance placed in the system prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Use simple, clear language. Be patient and encouraging.",
            Difficulty::Intermediate => "Use moderate complexity. Show some realistic challenges.",
            Difficulty::Advanced => {
                "Use more complex scenarios. Show realistic elderly behavior patterns."
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("Unknown difficulty level: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// PersonaVoice
// ---------------------------------------------------------------------------

/// In-character phrase vocabulary of one persona.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaVoice {
    /// Phrases that may open a reply ("Oh, dear,").
    pub starters: Vec<String>,
    /// Phrases that may close a reply ("..., you know.").
    pub enders: Vec<String>,
    /// Word substitutions `(from, to)`, matched case-insensitively on whole words.
    pub substitutions: Vec<(String, String)>,
    /// Lines used when no reply could be generated.
    pub apologies: Vec<String>,
}

impl PersonaVoice {
    fn from_static(
        starters: &[&str],
        enders: &[&str],
        substitutions: &[(&str, &str)],
        apologies: &[&str],
    ) -> Self {
        Self {
            starters: starters.iter().map(|s| s.to_string()).collect(),
            enders: enders.iter().map(|s| s.to_string()).collect(),
            substitutions: substitutions
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            apologies: apologies.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// PersonaProfile
// ---------------------------------------------------------------------------

/// Fixed identity of a simulated elderly character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    pub age: u32,
    /// Display condition name, e.g. "Mild Dementia".
    pub condition: String,
    pub traits: Vec<String>,
    pub background: String,
    /// Opening line for a new session.
    pub greeting: String,
    #[serde(default)]
    pub voice: PersonaVoice,
}

/// The three built-in personas.
pub fn default_roster() -> Vec<PersonaProfile> {
    vec![
        PersonaProfile {
            id: "margaret".to_string(),
            name: "Margaret".to_string(),
            age: 78,
            condition: "Mild Dementia".to_string(),
            traits: vec![
                "gentle".to_string(),
                "confused".to_string(),
                "formerly independent".to_string(),
            ],
            background: "Retired teacher who lives alone, family visits weekly".to_string(),
            greeting: "Hello dear, I'm Margaret. I was just looking at some old photos... \
                       they bring back such wonderful memories. How are you today?"
                .to_string(),
            voice: PersonaVoice::from_static(
                &["Oh, dear,", "Well now,", "Let me think,", "Oh my,"],
                &[", dear.", ", I think.", ", if I remember right.", ", you know."],
                &[
                    ("I am", "I'm"),
                    ("do not", "don't"),
                    ("cannot", "can't"),
                    ("it is", "it's"),
                ],
                &[
                    "Oh, I'm sorry, dear. I didn't quite catch that. Could you say it again?",
                    "I'm sorry, my mind wandered off for a moment. What were you saying?",
                    "Forgive me, dear, I lost my train of thought. Could you repeat that?",
                ],
            ),
        },
        PersonaProfile {
            id: "robert".to_string(),
            name: "Robert".to_string(),
            age: 72,
            condition: "Type 2 Diabetes".to_string(),
            traits: vec![
                "stubborn".to_string(),
                "independent".to_string(),
                "worried about burden".to_string(),
            ],
            background: "Retired mechanic, recently diagnosed, lives with adult son".to_string(),
            greeting: "Oh, hello there! I'm Robert. I was just trying to organize all these \
                       pill bottles... there seem to be more every week. Do you have a moment \
                       to chat?"
                .to_string(),
            voice: PersonaVoice::from_static(
                &["Well,", "Look,", "I'll tell you,", "Hmm,"],
                &[", I suppose.", ", that's how it is.", ", if you ask me.", ", anyway."],
                &[
                    ("I'm", "I am"),
                    ("don't", "do not"),
                    ("can't", "cannot"),
                    ("it's", "it is"),
                ],
                &[
                    "Sorry, I didn't quite catch that. Say it again?",
                    "Hmm, my hearing isn't what it used to be. What was that?",
                    "Come again? I missed that last part.",
                ],
            ),
        },
        PersonaProfile {
            id: "eleanor".to_string(),
            name: "Eleanor".to_string(),
            age: 83,
            condition: "Mobility Issues".to_string(),
            traits: vec![
                "proud".to_string(),
                "safety-conscious".to_string(),
                "socially active".to_string(),
            ],
            background: "Former nurse, uses a walker, afraid of falling".to_string(),
            greeting: "Good morning! I'm Eleanor. I was thinking about going to the community \
                       center today, but I'm not sure... What do you think?"
                .to_string(),
            voice: PersonaVoice::from_static(
                &["Goodness,", "You see,", "Now,", "Honestly,"],
                &[", I must say.", ", as it happens.", ", to be fair.", ", really."],
                &[
                    ("I'm", "I am"),
                    ("can't", "cannot"),
                    ("won't", "will not"),
                    ("a bit", "rather"),
                ],
                &[
                    "I beg your pardon, I didn't quite catch that. Would you repeat it?",
                    "I'm sorry, dear, I was distracted for a moment. What did you say?",
                    "Pardon me, could you say that once more?",
                ],
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_parse_is_case_insensitive() {
        assert_eq!("beginner".parse::<Difficulty>().unwrap(), Difficulty::Beginner);
        assert_eq!("ADVANCED".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert_eq!(" Intermediate ".parse::<Difficulty>().unwrap(), Difficulty::Intermediate);
        assert!("expert".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_roster_voices_are_complete() {
        let roster = default_roster();
        assert_eq!(roster.len(), 3);
        for p in &roster {
            assert!(!p.voice.starters.is_empty(), "{}", p.id);
            assert!(!p.voice.enders.is_empty(), "{}", p.id);
            assert!(!p.voice.substitutions.is_empty(), "{}", p.id);
            assert!(!p.voice.apologies.is_empty(), "{}", p.id);
        }
    }

    #[test]
    fn test_roster_conditions() {
        let roster = default_roster();
        let margaret = roster.iter().find(|p| p.id == "margaret").unwrap();
        assert_eq!(margaret.condition, "Mild Dementia");
        assert_eq!(margaret.age, 78);
    }
}
