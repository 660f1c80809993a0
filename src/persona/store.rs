//! Persona-keyed state with one lock per persona.
//!
//! A turn holds its persona's lock from emotion detection to memory update,
//! so concurrent sessions simulating the same persona never interleave
//! history writes. Different personas proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::memory::PersonaMemory;
use super::profile::PersonaProfile;
use crate::config::MemoryConfig;

/// Profile plus mutable memory of one persona.
#[derive(Debug)]
pub struct PersonaState {
    pub profile: Arc<PersonaProfile>,
    pub memory: PersonaMemory,
}

/// Registry of personas and their serialized state.
#[derive(Debug, Default)]
pub struct PersonaStore {
    states: DashMap<String, Arc<Mutex<PersonaState>>>,
    profiles: HashMap<String, Arc<PersonaProfile>>,
    order: Vec<String>,
}

impl PersonaStore {
    pub fn new(profiles: Vec<PersonaProfile>, memory: &MemoryConfig) -> Self {
        let states = DashMap::new();
        let mut by_id = HashMap::with_capacity(profiles.len());
        let mut order = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let profile = Arc::new(profile);
            order.push(profile.id.clone());
            by_id.insert(profile.id.clone(), Arc::clone(&profile));
            let state = PersonaState {
                profile,
                memory: PersonaMemory::new(memory.turn_cap, memory.context_cap),
            };
            states.insert(state.profile.id.clone(), Arc::new(Mutex::new(state)));
        }
        log::debug!("Persona store initialised with {:?}", order);
        Self {
            states,
            profiles: by_id,
            order,
        }
    }

    /// Acquire the persona's lock. `None` for unknown ids.
    pub async fn lock(&self, persona_id: &str) -> Option<OwnedMutexGuard<PersonaState>> {
        // clone the Arc first so no DashMap shard guard is held across .await
        let slot = self.states.get(persona_id).map(|e| Arc::clone(e.value()))?;
        Some(slot.lock_owned().await)
    }

    /// The persona's fixed profile, readable without taking its lock.
    pub fn profile(&self, persona_id: &str) -> Option<Arc<PersonaProfile>> {
        self.profiles.get(persona_id).cloned()
    }

    pub fn contains(&self, persona_id: &str) -> bool {
        self.states.contains_key(persona_id)
    }

    /// Persona ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }
}
