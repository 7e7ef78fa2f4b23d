//! Conversation state persistence.
//!
//! The engine checks a [`ConversationState`] out at turn start and back in
//! at turn end. Stores never see a partially processed turn: the caller only
//! saves after the whole turn succeeded.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, instrument};

use concierge_core::ids::ConversationId;
use concierge_core::state::{ConversationState, STATE_VERSION};

use crate::database::Database;
use crate::error::StoreError;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// `Ok(None)` when the conversation has never been saved.
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError>;

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), StoreError>;

    /// Returns whether a conversation was removed.
    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError>;
}

fn check_version(state: &ConversationState) -> Result<(), StoreError> {
    if state.version > STATE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: state.version,
            supported: STATE_VERSION,
        });
    }
    Ok(())
}

/// SQLite-backed store. One row per conversation holding the state as JSON.
#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Database,
}

impl SqliteConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load_blocking(db: &Database, id: &str) -> Result<Option<ConversationState>, StoreError> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT state FROM conversations WHERE id = ?1")?;
            let mut rows = stmt.query([id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let raw: String = row.get(0).map_err(|e| StoreError::CorruptRow {
                table: "conversations",
                column: "state",
                detail: e.to_string(),
            })?;
            let state: ConversationState =
                serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRow {
                    table: "conversations",
                    column: "state",
                    detail: format!("invalid JSON: {e}"),
                })?;
            check_version(&state)?;
            Ok(Some(state))
        })
    }

    fn save_blocking(db: &Database, id: &str, state: &ConversationState) -> Result<(), StoreError> {
        let payload = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, state_version, state, turn_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    state_version = excluded.state_version,
                    state = excluded.state,
                    turn_count = excluded.turn_count,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    id,
                    state.user_id,
                    state.version,
                    payload,
                    state.turn_count,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    fn delete_blocking(db: &Database, id: &str) -> Result<bool, StoreError> {
        db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        let db = self.db.clone();
        let id = id.as_str().to_string();
        let state = tokio::task::spawn_blocking(move || Self::load_blocking(&db, &id)).await??;
        debug!(found = state.is_some(), "conversation loaded");
        Ok(state)
    }

    #[instrument(skip(self, state), fields(conversation_id = %id, turn = state.turn_count))]
    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), StoreError> {
        check_version(state)?;
        let db = self.db.clone();
        let id = id.as_str().to_string();
        let state = state.clone();
        tokio::task::spawn_blocking(move || Self::save_blocking(&db, &id, &state)).await??;
        debug!("conversation saved");
        Ok(())
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let db = self.db.clone();
        let id = id.as_str().to_string();
        Ok(tokio::task::spawn_blocking(move || Self::delete_blocking(&db, &id)).await??)
    }
}

/// Process-local store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: DashMap<ConversationId, ConversationState>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.get(id).map(|s| s.value().clone()))
    }

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), StoreError> {
        check_version(state)?;
        let _ = self.states.insert(id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.states.remove(id).is_some())
    }
}
