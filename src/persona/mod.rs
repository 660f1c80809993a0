//! Simulated elderly personas.
//!
//! ```text
//! PersonaProfile (fixed identity, voice vocabulary)
//!   + PersonaMemory (bounded turns, display context, mood)
//!   = PersonaState, one tokio Mutex per persona id in PersonaStore
//! ```

pub mod memory;
pub mod profile;
pub mod store;

pub use memory::{ConversationTurn, PersonaMemory, Speaker};
pub use profile::{default_roster, Difficulty, PersonaProfile, PersonaVoice};
pub use store::{PersonaState, PersonaStore};
