//! Session registry
//!
//! Owns one conversation store per session plus the guard that admits a
//! single turn at a time. Currently in-memory; persistence is left to an
//! external collaborator implementing [`SessionStore`].

use crate::error::OrchestrationError;
use crate::memory::ConversationStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;
use uuid::Uuid;

/// Held for the lifetime of one turn
pub type TurnGuard = OwnedMutexGuard<()>;

/// One conversation and its turn guard
#[derive(Debug)]
pub struct Session {
    store: ConversationStore,
    turn: Arc<Mutex<()>>,
    created_at: DateTime<Utc>,
}

impl Session {
    fn new(session_id: Uuid) -> Self {
        Self {
            store: ConversationStore::with_session_id(session_id),
            turn: Arc::new(Mutex::new(())),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.store.session_id()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Admit a turn, or `None` if one is already running
    pub fn try_begin_turn(&self) -> Option<TurnGuard> {
        self.turn.clone().try_lock_owned().ok()
    }
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self) -> Result<Arc<Session>>;
    async fn load_session(&self, session_id: Uuid) -> Result<Arc<Session>>;
    async fn end_session(&self, session_id: Uuid) -> Result<()>;
    async fn list_sessions(&self) -> Result<Vec<Uuid>>;
}

/// In-memory session store for development
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(Uuid::new_v4()));

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id(), session.clone());

        info!(session_id = %session.id(), active = sessions.len(), "Session created");
        Ok(session)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(OrchestrationError::SessionNotFound(session_id))
    }

    async fn end_session(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&session_id)
            .ok_or(OrchestrationError::SessionNotFound(session_id))?;

        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Uuid>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.keys().copied().collect())
    }
}
