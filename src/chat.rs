//! One chat turn: retrieve places, ask the model, remember the exchange.
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::db::Db;
use crate::embedder::{Embedder, EmbedderError};
use crate::knowledge::{self, Place};
use crate::llm::{ChatModel, LlmError};
use crate::prompt;
use crate::session::{self, SessionStore};

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<Place>,
    pub session_id: String,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("search failed: {0}")]
    Search(#[from] rusqlite::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct ChatService {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    sessions: SessionStore,
    top_k: usize,
}

impl ChatService {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        top_k: usize,
        history_limit: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            model,
            sessions: SessionStore::new(history_limit),
            top_k,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Places closest to `message`, narrowed by the optional location.
    pub async fn retrieve(
        &self,
        message: &str,
        state: Option<&str>,
        city: Option<&str>,
    ) -> Result<Vec<Place>, ChatError> {
        let embedder = Arc::clone(&self.embedder);
        let text = message.to_string();
        // Inference is CPU-bound; keep it off the async workers.
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&text)).await??;

        let hits = self.db.lock().await.search(&query_vector, self.top_k)?;
        debug!("Retrieved {} candidate places", hits.len());

        let places = hits.into_iter().map(|h| h.place).collect();
        Ok(knowledge::filter_by_location(places, state, city))
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        if request.message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(session::new_session_id);

        let sources = self
            .retrieve(
                &request.message,
                request.state.as_deref(),
                request.city.as_deref(),
            )
            .await?;

        let history = self.sessions.history(&session_id).await;
        let context = prompt::build_context(&sources);
        let messages = prompt::build_messages(
            &history,
            prompt::build_user_message(&request.message, &context),
        );

        let started = Instant::now();
        let reply = self.model.complete(&messages).await?;
        info!(
            session = %session_id,
            sources = sources.len(),
            history = history.len(),
            "{} replied in {:?}",
            self.model.name(),
            started.elapsed()
        );

        self.sessions
            .record_exchange(&session_id, &request.message, &reply)
            .await;

        Ok(ChatResponse {
            response: reply,
            sources,
            session_id,
        })
    }
}
