//! Output guardrails applied after generation.
//!
//! Symptom grounding is enforced inside the generator; this module holds the
//! repetition guard that runs on the accepted reply.

pub mod repetition;

pub use repetition::{vary_with_voice, RepetitionGuard};
