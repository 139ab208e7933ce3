//! Per-session conversation history.
//!
//! The store maps session ids to their message history. Sessions are created
//! on first access and never removed. Each session sits behind its own async
//! mutex so turns on one session serialize while different sessions proceed
//! in parallel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// One utterance in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// History of a single session, oldest message first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed user/assistant exchanges
    pub fn turns(&self) -> usize {
        self.messages.len() / 2
    }
}

/// Exclusive access to one session, held for the duration of a turn.
///
/// While a guard is alive, other turns on the same session wait. Calling
/// [`SessionStore::append_user`] or [`SessionStore::append_assistant`] for the
/// guarded session from the guard holder would wait forever; append through
/// the guard instead.
pub struct SessionGuard {
    state: OwnedMutexGuard<ConversationState>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn history(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.clone()
    }

    /// Record a completed exchange: the user message, then the reply.
    pub fn commit_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.state.messages.push(Message::user(user));
        self.state.messages.push(Message::assistant(assistant));
        debug!(
            "Session {} now holds {} messages",
            self.state.session_id,
            self.state.messages.len()
        );
    }
}

/// Map of session id to conversation state
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        if let Some(slot) = self.sessions.read().await.get(session_id) {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!("Creating session {}", session_id);
            Arc::new(Mutex::new(ConversationState::new(session_id)))
        });
        Arc::clone(slot)
    }

    /// Snapshot of a session, creating an empty one if needed.
    pub async fn get(&self, session_id: &str) -> ConversationState {
        self.slot(session_id).await.lock().await.clone()
    }

    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.get(session_id).await.messages
    }

    pub async fn append_user(&self, session_id: &str, text: impl Into<String>) {
        self.append(session_id, Message::user(text)).await;
    }

    pub async fn append_assistant(&self, session_id: &str, text: impl Into<String>) {
        self.append(session_id, Message::assistant(text)).await;
    }

    async fn append(&self, session_id: &str, message: Message) {
        self.slot(session_id).await.lock().await.messages.push(message);
    }

    /// Wait for exclusive access to a session.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        SessionGuard {
            state: self.slot(session_id).await.lock_owned().await,
        }
    }

    /// Ids of every session seen so far, sorted
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
