//! In-character apology used when every strategy fails.

use crate::persona::profile::PersonaVoice;
use crate::utilities::text::stable_hash;

const GENERIC_APOLOGY: &str = "I'm sorry, I didn't quite catch that. Could you say it again?";

/// Pick an apology line for `utterance`.
///
/// The choice is a pure function of the utterance text, so the same failing
/// input always gets the same line.
pub fn fallback_line(voice: &PersonaVoice, utterance: &str) -> String {
    if voice.apologies.is_empty() {
        return GENERIC_APOLOGY.to_string();
    }
    let idx = (stable_hash(utterance) % voice.apologies.len() as u64) as usize;
    voice.apologies[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::profile::default_roster;

    #[test]
    fn test_fallback_is_deterministic_and_in_voice() {
        let roster = default_roster();
        let voice = &roster[0].voice;
        let a = fallback_line(voice, "What day is it?");
        assert_eq!(a, fallback_line(voice, "What day is it?"));
        assert!(voice.apologies.contains(&a));
    }

    #[test]
    fn test_fallback_spreads_over_lines() {
        let roster = default_roster();
        let voice = &roster[1].voice;
        let distinct: std::collections::HashSet<String> = (0..50)
            .map(|i| fallback_line(voice, &format!("utterance {}", i)))
            .collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn test_empty_voice_uses_generic_line() {
        assert_eq!(fallback_line(&PersonaVoice::default(), "hi"), GENERIC_APOLOGY);
    }
}
