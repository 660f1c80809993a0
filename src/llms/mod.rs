//! Completion services.
//!
//! - [`base_llm`] defines the [`BaseLLM`] trait, messages, and sampling
//!   parameters;
//! - [`providers`] holds the Ollama and OpenAI-compatible HTTP clients.

pub mod base_llm;
pub mod providers;

pub use base_llm::{BaseLLM, GenerationParams, LLMMessage, MessageRole};
pub use providers::{OllamaCompletion, OpenAICompatibleCompletion};
