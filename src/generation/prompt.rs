//! Prompt assembly.
//!
//! The system prompt is a tera template. Template names carry no file
//! extension, so tera does not HTML-escape persona text or retrieved chunks.

use tera::{Context, Tera};

use super::GenerationContext;
use crate::llms::base_llm::LLMMessage;
use crate::persona::memory::Speaker;
use crate::rag::types::ScoredChunk;
use crate::utilities::text::normalize_whitespace;

const SYSTEM_PROMPT: &str = r#"You are {{ name }}, a {{ age }}-year-old person with {{ condition }}.

PERSONALITY TRAITS: {{ traits }}
BACKGROUND: {{ background }}
CURRENT MOOD: {{ mood }}
DIFFICULTY LEVEL: {{ difficulty }}

CONDITION-SPECIFIC SYMPTOMS (use only these):
{% for symptom in symptoms -%}
- {{ symptom }}
{% endfor %}
CAREGIVER'S CURRENT EMOTION: {{ caregiver_emotion }}
{% if topics %}RECENT CONVERSATION TOPICS: {{ topics | join(sep=", ") }}
{% endif %}{% if chunks %}
CONTEXT FROM PRIOR EXAMPLES (match their tone, do not copy them):
{% for chunk in chunks -%}
[{{ loop.index }}] {{ chunk }}
{% endfor %}{% endif %}
RESPONSE GUIDELINES:
1. Stay in character as {{ name }}
2. Only reference symptoms from the list above
3. Respond naturally and briefly, in one to three sentences
4. Show realistic confusion or frustration when appropriate
5. Maintain dignity and respect
6. {{ guidance }}
7. Adapt your tone to the caregiver's emotion ({{ caregiver_emotion }})

EMOTION-ADAPTIVE RESPONSES:
- If the caregiver is confused: be extra patient and clear
- If the caregiver is frustrated: be calming and understanding
- If the caregiver is worried: be reassuring and gentle
- If the caregiver is happy: share in their positive energy appropriately

DO NOT:
- Invent new medical symptoms
- Provide medical advice
- Break character
- Use overly technical language
- Reference treatments or medications not mentioned

Respond as {{ name }} would in a conversation with a caregiver."#;

const ADAPTER_PROMPT: &str = r#"{{ name }}, {{ age }}, {{ condition }}. Mood: {{ mood }}. Symptoms: {{ symptoms | join(sep="; ") }}. Caregiver seems {{ caregiver_emotion }}. Reply in character, briefly."#;

/// Renders prompts and message lists for the generation strategies.
#[derive(Debug)]
pub struct PromptBuilder {
    tera: Tera,
    history_turns: usize,
}

impl PromptBuilder {
    pub fn new(history_turns: usize) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("system_prompt", SYSTEM_PROMPT)?;
        tera.add_raw_template("adapter_prompt", ADAPTER_PROMPT)?;
        Ok(Self {
            tera,
            history_turns,
        })
    }

    fn base_context(ctx: &GenerationContext<'_>) -> Context {
        let profile = ctx.profile;
        let mut context = Context::new();
        context.insert("name", &profile.name);
        context.insert("age", &profile.age);
        context.insert("condition", &profile.condition);
        context.insert("traits", &profile.traits.join(", "));
        context.insert("background", &profile.background);
        context.insert("mood", ctx.mood.as_str());
        context.insert("difficulty", ctx.difficulty.as_str());
        context.insert("guidance", ctx.difficulty.guidance());
        context.insert("symptoms", ctx.symptoms);
        context.insert("caregiver_emotion", ctx.caregiver_emotion.as_str());
        context.insert("topics", ctx.recent_topics);
        context
    }

    /// Full system prompt, optionally with retrieved chunks.
    pub fn system_prompt(
        &self,
        ctx: &GenerationContext<'_>,
        chunks: &[ScoredChunk],
    ) -> Result<String, tera::Error> {
        let mut context = Self::base_context(ctx);
        let chunk_texts: Vec<String> = chunks
            .iter()
            .map(|c| normalize_whitespace(&c.chunk.text))
            .collect();
        context.insert("chunks", &chunk_texts);
        self.tera.render("system_prompt", &context)
    }

    /// Compact single-line prompt for the adapter.
    pub fn adapter_prompt(&self, ctx: &GenerationContext<'_>) -> Result<String, tera::Error> {
        self.tera.render("adapter_prompt", &Self::base_context(ctx))
    }

    /// System prompt, the last turns of history, then the new utterance.
    pub fn messages(&self, ctx: &GenerationContext<'_>, system_prompt: String) -> Vec<LLMMessage> {
        let skip = ctx.history.len().saturating_sub(self.history_turns);
        let mut messages = Vec::with_capacity(self.history_turns + 2);
        messages.push(LLMMessage::system(system_prompt));
        for turn in ctx.history.iter().skip(skip) {
            if turn.text.trim().is_empty() {
                continue;
            }
            messages.push(match turn.speaker {
                Speaker::Caregiver => LLMMessage::user(turn.text.clone()),
                Speaker::Persona => LLMMessage::assistant(turn.text.clone()),
            });
        }
        messages.push(LLMMessage::user(ctx.utterance));
        messages
    }
}
