//! Error types for the response pipeline.
//!
//! Only [`PipelineError::UnknownPersona`] is ever surfaced to a caller of
//! [`crate::pipeline::ResponsePipeline::respond`]. Every other error type in
//! this module is recovered inside the pipeline: grounding errors become an
//! empty chunk list, generation errors advance the strategy chain, and an
//! exhausted chain becomes an in-character apology.

use thiserror::Error;

/// Errors rejected back to the caller of the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The persona id does not name a configured persona.
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),
}

/// Errors raised while assembling a pipeline, before any turn runs.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation setup failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Completion client setup failed: {0}")]
    Llm(#[from] LLMError),
}

/// Errors from a completion service.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Transport-level failure (connection refused, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body could not be interpreted.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Missing credentials or endpoint configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Retries were exhausted without a usable answer.
    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),
}

/// Errors from an embedding service.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Embedding API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The service answered but no vector could be extracted.
    #[error("Empty embedding returned for model '{0}'")]
    Empty(String),

    /// The vector has a different dimension than the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors while building, loading, or querying the retrieval index.
///
/// Surfaced by the index API; the retriever downgrades all of them to
/// "no grounding available".
#[derive(Debug, Error)]
pub enum GroundingError {
    /// Embedding a chunk or query failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Snapshot I/O failed.
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failed.
    #[error("Snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Snapshot was produced with a different model or corpus.
    #[error("Snapshot is stale: {0}")]
    StaleSnapshot(String),

    /// The embedding call exceeded its deadline.
    #[error("Retrieval timed out after {0} ms")]
    Timeout(u64),

    /// The index holds no chunks.
    #[error("Index is empty")]
    EmptyIndex,

    /// A blocking snapshot task panicked or was cancelled.
    #[error("Snapshot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Chunking policy is invalid.
    #[error("Invalid retrieval configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from one generation strategy, or from the whole chain.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The completion service failed.
    #[error("Completion failed: {0}")]
    Llm(#[from] LLMError),

    /// The completion call exceeded its deadline.
    #[error("Strategy '{strategy}' timed out after {millis} ms")]
    Timeout { strategy: &'static str, millis: u64 },

    /// Output was empty or too short after trimming.
    #[error("Insufficient output from '{strategy}' ({chars} chars)")]
    InsufficientOutput { strategy: &'static str, chars: usize },

    /// Output mentioned a symptom outside the active whitelist.
    #[error("Output from '{strategy}' mentions foreign symptom '{symptom}'")]
    Ungrounded { strategy: &'static str, symptom: String },

    /// Retrieval-augmented strategy invoked without any chunk.
    #[error("No retrieved context available")]
    NoGrounding,

    /// Prompt rendering failed.
    #[error("Prompt rendering failed: {0}")]
    Prompt(#[from] tera::Error),

    /// Every strategy in the chain failed.
    #[error("All generation strategies exhausted")]
    AllStrategiesExhausted,
}

/// Errors while reading the symptom source table.
#[derive(Debug, Error)]
pub enum SymptomSourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header lacks a `condition` or `symptom` column.
    #[error("Missing column '{0}' in symptom table header")]
    MissingColumn(&'static str),

    /// The table parsed but yielded no rows.
    #[error("Symptom table is empty")]
    Empty,
}

/// Errors while reading the dialogue corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line was not a valid corpus record.
    #[error("Invalid corpus record on line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field holds a value outside its valid range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from a conversation store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    NotFound(uuid::Uuid),

    #[error("Session {0} has ended")]
    Ended(uuid::Uuid),
}
