//! Pipeline configuration.
//!
//! Every section is `#[serde(default)]`, so a YAML file only needs to name
//! the values it changes. Environment variables are applied on top of the
//! file by [`PipelineConfig::apply_env_overrides`].
//!
//! ```yaml
//! emotion:
//!   negation_multiplier: 0.25
//! retrieval:
//!   top_k: 3
//!   index_path: data/index.json
//! generation:
//!   model: llama2
//!   adapter_model: elder-care-lora
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Weights applied by the caregiver emotion scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionWeights {
    /// Multiplier when the keyword is preceded by an intensifier.
    pub intensifier_multiplier: f64,
    /// Multiplier when a negation appears within `negation_window` tokens
    /// before the keyword.
    pub negation_multiplier: f64,
    /// Multiplier applied to every hit when the text contains '?'.
    pub question_multiplier: f64,
    /// Minimum winning weight; anything lower scores as neutral.
    pub significance_threshold: f64,
    /// Number of tokens before a keyword inspected for negations.
    pub negation_window: usize,
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            intensifier_multiplier: 1.5,
            negation_multiplier: 0.3,
            question_multiplier: 0.8,
            significance_threshold: 0.5,
            negation_window: 3,
        }
    }
}

/// Chunking, embedding, and lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Disable retrieval entirely.
    pub enabled: bool,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks fetched per query.
    pub top_k: usize,
    /// Chunks placed into the prompt.
    pub prompt_chunks: usize,
    /// Drop chunks tagged for a different persona.
    pub persona_filter: bool,
    /// Deadline for embedding the query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Embedding requests in flight while building the index.
    pub build_concurrency: usize,
    /// Snapshot location. No snapshot is written when unset.
    pub index_path: Option<PathBuf>,
    /// JSONL corpus. The built-in sample corpus is used when unset or missing.
    pub corpus_path: Option<PathBuf>,
    /// Embedding backend: "ollama" or "hashing".
    pub embedding_provider: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Embedding service base URL.
    pub embedding_url: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 512,
            chunk_overlap: 100,
            top_k: 5,
            prompt_chunks: 3,
            persona_filter: true,
            query_timeout_ms: 5_000,
            build_concurrency: 4,
            index_path: None,
            corpus_path: None,
            embedding_provider: "ollama".to_string(),
            embedding_model: "all-minilm".to_string(),
            embedding_url: "http://localhost:11434".to_string(),
        }
    }
}

/// Completion service and strategy chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base model for the retrieval-augmented and plain strategies.
    pub model: String,
    /// Ollama base URL.
    pub base_url: String,
    /// Fine-tuned adapter model. The adapter strategy is skipped when unset.
    pub adapter_model: Option<String>,
    /// OpenAI-compatible endpoint serving the adapter.
    pub adapter_url: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repetition_penalty: f64,
    pub max_tokens: u32,
    /// Adapter output must be longer than this after trimming.
    pub min_adapter_chars: usize,
    /// Deadline for one strategy attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Retries inside one completion call.
    pub max_retries: u32,
    /// Prior turns included as chat messages.
    pub history_turns: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            base_url: "http://localhost:11434".to_string(),
            adapter_model: None,
            adapter_url: None,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repetition_penalty: 1.1,
            max_tokens: 150,
            min_adapter_chars: 10,
            timeout_ms: 30_000,
            max_retries: 1,
            history_turns: 5,
        }
    }
}

/// Repetition guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepetitionConfig {
    /// Jaccard similarity at or above which a candidate is repetitive.
    pub threshold: f64,
    /// Recent outputs remembered per persona.
    pub window: usize,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            window: 5,
        }
    }
}

/// Persona memory bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Raw turns kept for retrieval queries and topic summaries.
    pub turn_cap: usize,
    /// Display memory entries kept.
    pub context_cap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            turn_cap: 10,
            context_cap: 20,
        }
    }
}

/// Symptom source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SymptomConfig {
    /// CSV with `condition` and `symptom` columns.
    pub source_path: Option<PathBuf>,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub emotion: EmotionWeights,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub repetition: RepetitionConfig,
    pub memory: MemoryConfig,
    pub symptoms: SymptomConfig,
}

impl PipelineConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loaded pipeline configuration from {}", path.as_ref().display());
        Self::from_yaml_str(&raw)
    }

    /// Load from `GERONTO_CONFIG` if set, otherwise defaults; then apply
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("GERONTO_CONFIG") {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GERONTO_OLLAMA_URL") {
            self.generation.base_url = url.clone();
            self.retrieval.embedding_url = url;
        }
        if let Some(model) = lookup("GERONTO_MODEL") {
            self.generation.model = model;
        }
        if let Some(model) = lookup("GERONTO_ADAPTER_MODEL") {
            self.generation.adapter_model = Some(model);
        }
        if let Some(url) = lookup("GERONTO_ADAPTER_URL") {
            self.generation.adapter_url = Some(url);
        }
        if let Some(model) = lookup("GERONTO_EMBED_MODEL") {
            self.retrieval.embedding_model = model;
        }
        if let Some(path) = lookup("GERONTO_INDEX_PATH") {
            self.retrieval.index_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("GERONTO_CORPUS_PATH") {
            self.retrieval.corpus_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("GERONTO_SYMPTOMS_PATH") {
            self.symptoms.source_path = Some(PathBuf::from(path));
        }
    }

    /// Reject values that would break an invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(ConfigError::Invalid("retrieval.chunk_size must be > 0".into()));
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            )));
        }
        if r.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.repetition.threshold) {
            return Err(ConfigError::Invalid(
                "repetition.threshold must be within [0, 1]".into(),
            ));
        }
        if self.repetition.window == 0 {
            return Err(ConfigError::Invalid("repetition.window must be > 0".into()));
        }
        if self.memory.turn_cap == 0 || self.memory.context_cap == 0 {
            return Err(ConfigError::Invalid("memory caps must be > 0".into()));
        }
        let e = &self.emotion;
        for (name, value) in [
            ("emotion.intensifier_multiplier", e.intensifier_multiplier),
            ("emotion.negation_multiplier", e.negation_multiplier),
            ("emotion.question_multiplier", e.question_multiplier),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be >= 0", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.emotion.negation_multiplier, 0.3);
        assert_eq!(config.retrieval.chunk_size, 512);
        assert_eq!(config.memory.context_cap, 20);
        assert_eq!(config.repetition.window, 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
emotion:
  negation_multiplier: 0.25
retrieval:
  top_k: 3
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.emotion.negation_multiplier, 0.25);
        assert_eq!(config.emotion.question_multiplier, 0.8);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.chunk_overlap, 100);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let yaml = r#"
retrieval:
  chunk_size: 100
  chunk_overlap: 100
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GERONTO_OLLAMA_URL", "http://ollama:11434"),
            ("GERONTO_ADAPTER_MODEL", "elder-care-lora"),
            ("GERONTO_INDEX_PATH", "/tmp/index.json"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.generation.base_url, "http://ollama:11434");
        assert_eq!(config.retrieval.embedding_url, "http://ollama:11434");
        assert_eq!(config.generation.adapter_model.as_deref(), Some("elder-care-lora"));
        assert_eq!(
            config.retrieval.index_path,
            Some(PathBuf::from("/tmp/index.json"))
        );
    }
}
