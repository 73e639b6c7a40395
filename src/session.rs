//! In-memory conversation history keyed by session ID.
//!
//! Sessions have no expiry and are lost on restart.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as TokioMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Fresh random session identifier.
#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Bounded per-session history.
///
/// A chat turn reads the history before calling the model and appends after
/// it, so two turns racing on one session may not see each other's exchange.
/// Both exchanges are still appended.
pub struct SessionStore {
    sessions: TokioMutex<HashMap<String, Vec<ChatMessage>>>,
    history_limit: usize,
}

impl SessionStore {
    /// `history_limit` is the number of messages kept per session.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: TokioMutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// Snapshot of a session's history; empty for unknown sessions.
    pub async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one completed exchange and drop the oldest messages beyond
    /// the limit.
    pub async fn record_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.sessions.lock().await;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::user(user));
        history.push(ChatMessage::assistant(assistant));
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }
    }

    /// Number of sessions with at least one recorded exchange.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
