//! One caregiver utterance in, one persona reply out.
//!
//! A turn walks through the [`TurnStage`]s in order while holding the
//! persona's lock:
//!
//! ```text
//! ReceivedInput → EmotionDetected → Grounded → Generated
//!               → RepetitionChecked → MemoryUpdated → Done
//! ```
//!
//! Every stage after the persona lookup has a safe default (no chunks, the
//! next strategy, the in-character apology, the unmodified candidate), so
//! [`ResponsePipeline::respond`] fails only for an unknown persona id.

pub mod record;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::emotion::output::{OutputClassifier, PersonaEmotion};
use crate::emotion::{EmotionLabel, EmotionScorer};
use crate::error::{GroundingError, PipelineError, SetupError};
use crate::generation::{
    adapter_client, base_client, fallback_line, GeneratedReply, GenerationContext,
    ResponseGenerator,
};
use crate::guardrails::RepetitionGuard;
use crate::llms::base_llm::BaseLLM;
use crate::persona::memory::ConversationTurn;
use crate::persona::profile::{default_roster, Difficulty, PersonaProfile};
use crate::persona::store::{PersonaState, PersonaStore};
use crate::rag::embeddings::{create_embedder, EmbeddingService};
use crate::rag::retriever::{RetrievalStatus, Retriever};
use crate::rag::types::CorpusRecord;
use crate::symptoms::SymptomAnchor;
use crate::utilities::text::truncate_chars;

pub use record::{PersonaStateSnapshot, ResponseRecord};

/// Display entries reported in each record's persona snapshot.
const SNAPSHOT_ENTRIES: usize = 5;
/// Caregiver utterances summarized as recent topics.
const TOPIC_TURNS: usize = 3;
const LOGGED_UTTERANCE_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// TurnStage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    ReceivedInput,
    EmotionDetected,
    Grounded,
    Generated,
    RepetitionChecked,
    MemoryUpdated,
    Done,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStage::ReceivedInput => "received_input",
            TurnStage::EmotionDetected => "emotion_detected",
            TurnStage::Grounded => "grounded",
            TurnStage::Generated => "generated",
            TurnStage::RepetitionChecked => "repetition_checked",
            TurnStage::MemoryUpdated => "memory_updated",
            TurnStage::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(stage: TurnStage, detail: impl fmt::Display) {
    tracing::debug!(stage = %stage, "{}", detail);
}

// ---------------------------------------------------------------------------
// ResponsePipeline
// ---------------------------------------------------------------------------

/// The persona-grounded response pipeline.
#[derive(Debug)]
pub struct ResponsePipeline {
    config: PipelineConfig,
    personas: PersonaStore,
    symptoms: Arc<SymptomAnchor>,
    scorer: EmotionScorer,
    classifier: OutputClassifier,
    retriever: Arc<Retriever>,
    generator: ResponseGenerator,
    guard: RepetitionGuard,
}

impl ResponsePipeline {
    pub fn builder(config: PipelineConfig) -> ResponsePipelineBuilder {
        ResponsePipelineBuilder::new(config)
    }

    /// Pipeline with every collaborator created from `config`.
    pub async fn from_config(config: PipelineConfig) -> Result<Self, SetupError> {
        Self::builder(config).build().await
    }

    /// Produce the persona's reply to one caregiver utterance.
    ///
    /// `history` is the caller's view of the conversation; when empty the
    /// persona's own memory supplies the recent turns.
    #[tracing::instrument(
        name = "respond",
        skip_all,
        fields(persona_id = %persona_id, difficulty = %difficulty)
    )]
    pub async fn respond(
        &self,
        persona_id: &str,
        utterance: &str,
        history: &[ConversationTurn],
        difficulty: Difficulty,
    ) -> Result<ResponseRecord, PipelineError> {
        let mut state = self
            .personas
            .lock(persona_id)
            .await
            .ok_or_else(|| PipelineError::UnknownPersona(persona_id.to_string()))?;
        enter(TurnStage::ReceivedInput, truncate_chars(utterance, LOGGED_UTTERANCE_CHARS));

        let caregiver_emotion = self.scorer.score(utterance);
        enter(TurnStage::EmotionDetected, caregiver_emotion);

        let profile = Arc::clone(&state.profile);
        let symptoms = self.symptoms.symptoms_for(&profile.condition);
        if symptoms.is_empty() {
            log::warn!("No symptom whitelist for condition '{}'", profile.condition);
        }
        let query = retrieval_query(utterance, &profile, caregiver_emotion);
        let chunks = self.retriever.retrieve(&query, persona_id).await;
        enter(TurnStage::Grounded, format!("{} chunks", chunks.len()));

        let own_history;
        let history = if history.is_empty() {
            own_history = state.memory.recent(self.config.generation.history_turns);
            own_history.as_slice()
        } else {
            history
        };
        let recent_topics = state.memory.recent_topics(TOPIC_TURNS);
        let ctx = GenerationContext {
            profile: &profile,
            mood: state.memory.mood(),
            utterance,
            history,
            symptoms,
            caregiver_emotion,
            difficulty,
            recent_topics: &recent_topics,
            chunks: &chunks,
        };
        let reply = match self.generator.generate(&ctx).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("[{}] {}; answering with apology", persona_id, e);
                GeneratedReply::fallback(fallback_line(&profile.voice, utterance))
            }
        };
        let strategy = reply.strategy;
        enter(TurnStage::Generated, strategy);

        let varied = self.guard.is_repetitive(&reply.text, persona_id);
        let text = if varied {
            self.guard.vary(&reply.text, persona_id)
        } else {
            reply.text.clone()
        };
        self.guard.record(persona_id, &text);
        enter(TurnStage::RepetitionChecked, if varied { "varied" } else { "kept" });

        let persona_emotion = self.classifier.classify(&text);
        remember_turn(&mut state, utterance, caregiver_emotion, &text, persona_emotion);
        enter(TurnStage::MemoryUpdated, persona_emotion);

        let record = ResponseRecord {
            persona_id: persona_id.to_string(),
            text,
            persona_emotion,
            caregiver_emotion,
            confidence: strategy.base_confidence(),
            grounded: reply.is_grounded(),
            chunk_count: reply.chunks.len(),
            chunks: reply.chunks.iter().map(|c| c.chunk.text.clone()).collect(),
            difficulty,
            strategy,
            varied,
            persona_state: snapshot(&state),
            timestamp: Utc::now(),
        };
        enter(TurnStage::Done, format!("confidence {:.2}", record.confidence));
        Ok(record)
    }

    /// The persona's opening line.
    pub fn greeting(&self, persona_id: &str) -> Result<String, PipelineError> {
        self.personas
            .profile(persona_id)
            .map(|p| p.greeting.clone())
            .ok_or_else(|| PipelineError::UnknownPersona(persona_id.to_string()))
    }

    /// Clear the persona's mood, history, and repetition cache.
    pub async fn reset(&self, persona_id: &str) -> Result<(), PipelineError> {
        let mut state = self
            .personas
            .lock(persona_id)
            .await
            .ok_or_else(|| PipelineError::UnknownPersona(persona_id.to_string()))?;
        state.memory.reset();
        self.guard.reset(persona_id);
        log::info!("Reset persona '{}'", persona_id);
        Ok(())
    }

    pub async fn persona_state(&self, persona_id: &str) -> Result<PersonaStateSnapshot, PipelineError> {
        let state = self
            .personas
            .lock(persona_id)
            .await
            .ok_or_else(|| PipelineError::UnknownPersona(persona_id.to_string()))?;
        Ok(snapshot(&state))
    }

    pub fn persona_ids(&self) -> &[String] {
        self.personas.ids()
    }

    /// Build a new retrieval index from `records` and swap it in.
    pub async fn rebuild_index(&self, records: &[CorpusRecord]) -> Result<usize, GroundingError> {
        self.retriever.rebuild(records).await
    }

    pub fn retrieval_status(&self) -> RetrievalStatus {
        self.retriever.status()
    }

    pub fn symptoms(&self) -> &SymptomAnchor {
        &self.symptoms
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

/// Utterance biased with the persona's condition and the caregiver's emotion.
fn retrieval_query(utterance: &str, profile: &PersonaProfile, emotion: EmotionLabel) -> String {
    format!("{} {} {}", utterance.trim(), profile.condition, emotion)
}

fn remember_turn(
    state: &mut PersonaState,
    utterance: &str,
    caregiver_emotion: EmotionLabel,
    reply: &str,
    persona_emotion: PersonaEmotion,
) {
    let name = state.profile.name.clone();
    let memory = &mut state.memory;
    memory.append(ConversationTurn::caregiver(utterance).with_emotion(caregiver_emotion.as_str()));
    memory.append(ConversationTurn::persona(reply).with_emotion(persona_emotion.as_str()));
    memory.push_context(format!("Caregiver: {}", utterance));
    memory.push_context(format!("{}: {}", name, reply));
    memory.set_mood(persona_emotion);
}

fn snapshot(state: &PersonaState) -> PersonaStateSnapshot {
    PersonaStateSnapshot {
        mood: state.memory.mood(),
        condition: state.profile.condition.clone(),
        memory: state.memory.recent_context(SNAPSHOT_ENTRIES),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`ResponsePipeline`], creating any collaborator not supplied.
#[derive(Debug)]
pub struct ResponsePipelineBuilder {
    config: PipelineConfig,
    personas: Option<Vec<PersonaProfile>>,
    symptoms: Option<SymptomAnchor>,
    llm: Option<Arc<dyn BaseLLM>>,
    adapter: Option<Arc<dyn BaseLLM>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    retriever: Option<Arc<Retriever>>,
}

impl ResponsePipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            personas: None,
            symptoms: None,
            llm: None,
            adapter: None,
            embedder: None,
            retriever: None,
        }
    }

    pub fn personas(mut self, personas: Vec<PersonaProfile>) -> Self {
        self.personas = Some(personas);
        self
    }

    pub fn symptoms(mut self, symptoms: SymptomAnchor) -> Self {
        self.symptoms = Some(symptoms);
        self
    }

    /// Completion service for the retrieval-augmented and plain strategies.
    pub fn llm(mut self, llm: Arc<dyn BaseLLM>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Completion service for the adapter strategy.
    pub fn adapter(mut self, adapter: Arc<dyn BaseLLM>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub async fn build(self) -> Result<ResponsePipeline, SetupError> {
        let config = self.config;
        config.validate()?;

        let symptoms = Arc::new(
            self.symptoms
                .unwrap_or_else(|| SymptomAnchor::load(config.symptoms.source_path.as_deref())),
        );
        let profiles = self.personas.unwrap_or_else(default_roster);

        let llm = match self.llm {
            Some(llm) => llm,
            None => base_client(&config.generation)?,
        };
        let adapter = match self.adapter {
            Some(adapter) => Some(adapter),
            None => adapter_client(&config.generation)?,
        };
        let generator = ResponseGenerator::standard(
            &config.generation,
            llm,
            adapter,
            config.retrieval.prompt_chunks,
            Arc::clone(&symptoms),
        )?;

        let retriever = match self.retriever {
            Some(retriever) => retriever,
            None => {
                let embedder = self
                    .embedder
                    .unwrap_or_else(|| create_embedder(&config.retrieval));
                Arc::new(open_retriever(&config, embedder).await?)
            }
        };

        let guard = RepetitionGuard::new(&config.repetition, &profiles);
        let personas = PersonaStore::new(profiles, &config.memory);
        log::info!(
            "Pipeline ready: personas={:?}, strategies={:?}, chunks={}",
            personas.ids(),
            generator.strategy_kinds(),
            retriever.status().chunk_count
        );

        Ok(ResponsePipeline {
            scorer: EmotionScorer::new(config.emotion.clone()),
            classifier: OutputClassifier::new(),
            config,
            personas,
            symptoms,
            retriever,
            generator,
            guard,
        })
    }
}

/// Open the retriever, degrading to an empty index when grounding is unavailable.
async fn open_retriever(
    config: &PipelineConfig,
    embedder: Arc<dyn EmbeddingService>,
) -> Result<Retriever, SetupError> {
    match Retriever::open(config.retrieval.clone(), Arc::clone(&embedder)).await {
        Ok(retriever) => Ok(retriever),
        Err(e) => {
            log::warn!("Grounding unavailable at startup: {}. Continuing without retrieval", e);
            Ok(Retriever::empty(config.retrieval.clone(), embedder)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::generation::StrategyKind;
    use crate::rag::embeddings::HashingEmbedding;
    use crate::testing::{FailingEmbedding, FailingLLM, ScriptedLLM};

    fn config() -> PipelineConfig {
        PipelineConfig {
            retrieval: RetrievalConfig {
                embedding_provider: "hashing".to_string(),
                ..RetrievalConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    async fn pipeline(llm: Arc<dyn BaseLLM>) -> ResponsePipeline {
        ResponsePipeline::builder(config())
            .llm(llm)
            .embedder(Arc::new(HashingEmbedding::default()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_margaret_neutral_greeting_turn() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating(
            "Oh, I'm doing alright, dear. I was looking at my photos.",
        )))
        .await;
        let record = p
            .respond("margaret", "How are you feeling today?", &[], Difficulty::Beginner)
            .await
            .unwrap();

        assert_eq!(record.caregiver_emotion, EmotionLabel::Neutral);
        assert!(!record.text.is_empty());
        assert_eq!(record.persona_state.condition, "Mild Dementia");
        assert_eq!(record.difficulty, Difficulty::Beginner);
        assert!(record.grounded);
        assert_eq!(record.strategy, StrategyKind::RetrievalAugmented);
        assert_eq!(record.chunk_count, record.chunks.len());
        assert!(record.chunk_count > 0);
        assert!(record.chunk_count <= p.config().retrieval.prompt_chunks);
        assert_eq!(record.persona_state.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_robert_worried_caregiver() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating(
            "Don't fuss, I'm managing fine with the pills.",
        )))
        .await;
        let record = p
            .respond(
                "robert",
                "I'm really worried about my diabetes",
                &[],
                Difficulty::Intermediate,
            )
            .await
            .unwrap();
        assert_eq!(record.caregiver_emotion, EmotionLabel::Worried);
        assert_eq!(record.persona_state.condition, "Type 2 Diabetes");
    }

    #[tokio::test]
    async fn test_identical_turns_are_varied() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating(
            "I think I had breakfast this morning. Or was that yesterday?",
        )))
        .await;
        let mut outputs = std::collections::HashSet::new();
        let mut varied = 0;
        for _ in 0..5 {
            let record = p
                .respond("margaret", "Did you eat breakfast?", &[], Difficulty::Beginner)
                .await
                .unwrap();
            varied += usize::from(record.varied);
            outputs.insert(record.text);
        }
        assert!(outputs.len() >= 2);
        assert!(varied >= 1);
    }

    #[tokio::test]
    async fn test_unknown_persona_is_rejected() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating("Hello."))).await;
        let err = p
            .respond("nobody", "Hi", &[], Difficulty::Beginner)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPersona(id) if id == "nobody"));
        assert!(p.greeting("nobody").is_err());
        assert!(p.reset("nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_all_strategies_failing_gives_apology() {
        let p = pipeline(Arc::new(FailingLLM)).await;
        let record = p
            .respond("eleanor", "Shall we go for a walk?", &[], Difficulty::Advanced)
            .await
            .unwrap();
        assert_eq!(record.strategy, StrategyKind::Fallback);
        assert!(record.is_fallback());
        assert!((record.confidence - 0.3).abs() < f64::EPSILON);
        let roster = default_roster();
        assert!(roster[2].voice.apologies.contains(&record.text));
        // chunks were retrieved, but the apology is not built from them
        assert!(!record.grounded);
        assert_eq!(record.chunk_count, 0);
        assert!(record.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_grounding_failure_still_answers() {
        let retriever =
            Retriever::empty(config().retrieval, Arc::new(FailingEmbedding)).unwrap();
        let p = ResponsePipeline::builder(config())
            .llm(Arc::new(ScriptedLLM::repeating("I'm fine, thank you.")))
            .retriever(Arc::new(retriever))
            .build()
            .await
            .unwrap();
        let record = p
            .respond("margaret", "Hello!", &[], Difficulty::Beginner)
            .await
            .unwrap();
        assert!(!record.grounded);
        assert_eq!(record.chunk_count, 0);
        assert!(record.chunks.is_empty());
        assert_eq!(record.strategy, StrategyKind::Plain);
        assert!((record.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_plain_reply_after_retrieval_failure_is_ungrounded() {
        let llm = Arc::new(ScriptedLLM::sequence(vec!["  ", "I'm well enough, thank you."]));
        let p = pipeline(llm).await;
        let record = p
            .respond("margaret", "How are you feeling today?", &[], Difficulty::Beginner)
            .await
            .unwrap();
        assert_eq!(record.strategy, StrategyKind::Plain);
        assert!(!record.grounded);
        assert_eq!(record.chunk_count, 0);
        assert!(record.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_no_foreign_symptoms_in_records() {
        // first candidate claims a diabetes symptom for margaret
        let llm = Arc::new(ScriptedLLM::sequence(vec![
            "My blurred vision is bad today.",
            "I keep forgetting where I put my keys.",
        ]));
        let p = pipeline(llm).await;
        let record = p
            .respond("margaret", "How are you?", &[], Difficulty::Beginner)
            .await
            .unwrap();
        assert!(p
            .symptoms()
            .find_foreign_claim(&record.text, "Mild Dementia")
            .is_none());
        assert_eq!(record.text, "I keep forgetting where I put my keys.");
    }

    #[tokio::test]
    async fn test_memory_and_mood_update_then_reset() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating(
            "I'm sorry, I feel so confused today.",
        )))
        .await;
        p.respond("margaret", "Hello", &[], Difficulty::Beginner)
            .await
            .unwrap();
        let state = p.persona_state("margaret").await.unwrap();
        assert_eq!(state.mood, PersonaEmotion::Empathetic);
        assert_eq!(state.memory[0], "Caregiver: Hello");

        p.reset("margaret").await.unwrap();
        let state = p.persona_state("margaret").await.unwrap();
        assert_eq!(state.mood, PersonaEmotion::Neutral);
        assert!(state.memory.is_empty());
    }

    #[tokio::test]
    async fn test_memory_snapshot_is_bounded() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating("Alright then."))).await;
        for i in 0..12 {
            p.respond("robert", &format!("Question number {}", i), &[], Difficulty::Beginner)
                .await
                .unwrap();
        }
        let state = p.persona_state("robert").await.unwrap();
        assert_eq!(state.memory.len(), SNAPSHOT_ENTRIES);
    }

    #[tokio::test]
    async fn test_greeting_and_status() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating("Hi."))).await;
        assert!(p.greeting("eleanor").unwrap().contains("Eleanor"));
        assert_eq!(p.persona_ids(), ["margaret", "robert", "eleanor"]);

        let status = p.retrieval_status();
        assert!(status.enabled);
        assert!(status.chunk_count > 0);
        assert_eq!(status.embedding_model, "hashing-256");
    }

    #[tokio::test]
    async fn test_rebuild_index_swaps() {
        let p = pipeline(Arc::new(ScriptedLLM::repeating("Hi."))).await;
        let records = vec![CorpusRecord::new("My knees ache when I climb stairs.")
            .with_persona("eleanor", "mobility_issues")];
        let count = p.rebuild_index(&records).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(p.retrieval_status().chunk_count, 1);
    }
}
