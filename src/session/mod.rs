//! Conversation persistence boundary.
//!
//! The pipeline itself keeps only bounded per-persona memory. Callers that
//! need the full transcript of a training session (for scoring, replay, or
//! to pass history back into [`respond`](crate::pipeline::ResponsePipeline::respond))
//! go through a [`ConversationStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::persona::memory::ConversationTurn;
use crate::persona::profile::Difficulty;
use crate::pipeline::ResponseRecord;

/// Metadata of one training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub persona_id: String,
    pub difficulty: Difficulty,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub turn_count: usize,
}

impl SessionInfo {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Storage for session transcripts.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Open a session and return its metadata.
    async fn create_session(
        &self,
        persona_id: &str,
        difficulty: Difficulty,
    ) -> Result<SessionInfo, SessionError>;

    async fn session(&self, session_id: Uuid) -> Result<SessionInfo, SessionError>;

    /// Append a turn. Ended sessions reject writes.
    async fn append_turn(&self, session_id: Uuid, turn: ConversationTurn)
        -> Result<(), SessionError>;

    /// The last `limit` turns, oldest first.
    async fn history(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, SessionError>;

    async fn end_session(&self, session_id: Uuid) -> Result<SessionInfo, SessionError>;

    /// Append the caregiver utterance and the persona reply of one turn.
    async fn record_exchange(
        &self,
        session_id: Uuid,
        utterance: &str,
        record: &ResponseRecord,
    ) -> Result<(), SessionError> {
        self.append_turn(
            session_id,
            ConversationTurn::caregiver(utterance).with_emotion(record.caregiver_emotion.as_str()),
        )
        .await?;
        self.append_turn(
            session_id,
            ConversationTurn::persona(record.text.clone())
                .with_emotion(record.persona_emotion.as_str()),
        )
        .await
    }
}

#[derive(Debug)]
struct SessionEntry {
    info: SessionInfo,
    turns: Vec<ConversationTurn>,
}

/// Process-local [`ConversationStore`].
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_session(
        &self,
        persona_id: &str,
        difficulty: Difficulty,
    ) -> Result<SessionInfo, SessionError> {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            persona_id: persona_id.to_string(),
            difficulty,
            started_at: Utc::now(),
            ended_at: None,
            turn_count: 0,
        };
        self.sessions.insert(
            info.id,
            SessionEntry {
                info: info.clone(),
                turns: Vec::new(),
            },
        );
        log::debug!("Created session {} for persona '{}'", info.id, persona_id);
        Ok(info)
    }

    async fn session(&self, session_id: Uuid) -> Result<SessionInfo, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.info.clone())
            .ok_or(SessionError::NotFound(session_id))
    }

    async fn append_turn(
        &self,
        session_id: Uuid,
        turn: ConversationTurn,
    ) -> Result<(), SessionError> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        if !entry.info.is_active() {
            return Err(SessionError::Ended(session_id));
        }
        entry.turns.push(turn);
        entry.info.turn_count += 1;
        Ok(())
    }

    async fn history(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, SessionError> {
        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        let skip = entry.turns.len().saturating_sub(limit);
        Ok(entry.turns[skip..].to_vec())
    }

    async fn end_session(&self, session_id: Uuid) -> Result<SessionInfo, SessionError> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        if entry.info.ended_at.is_none() {
            entry.info.ended_at = Some(Utc::now());
        }
        Ok(entry.info.clone())
    }
}
