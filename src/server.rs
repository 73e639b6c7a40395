//! HTTP surface: `GET /health` and `POST /chat`.
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowHeaders, CorsLayer, ExposeHeaders};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::chat::{ChatError, ChatRequest, ChatResponse, ChatService};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Error body in the `{"detail": ...}` shape the web client expects.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match err {
            ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Backend is running",
    })
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    match state.chat.chat(request).await {
        Ok(resp) => Ok(Json(resp)),
        Err(e) => {
            if matches!(e, ChatError::EmptyMessage) {
                warn!("Rejected chat request: {e}");
            } else {
                error!("Chat request failed: {e}");
            }
            Err(e.into())
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any())
        .allow_credentials(false)
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves when Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Bind `addr` and serve until a shutdown signal.
pub async fn serve(addr: &str, state: AppState, allowed_origins: &[String]) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, allowed_origins))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::embedder::mock::MockEmbedder;
    use crate::llm::scripted::ScriptedModel;
    use tokio::sync::Mutex as TokioMutex;

    fn state(model: Arc<ScriptedModel>) -> AppState {
        let db = Db::open_in_memory(32).unwrap();
        let chat = ChatService::new(
            Arc::new(TokioMutex::new(db)),
            Arc::new(MockEmbedder::new(32)),
            model,
            5,
            10,
        );
        AppState {
            chat: Arc::new(chat),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.message, "Backend is running");
    }

    #[tokio::test]
    async fn test_chat_ok_on_empty_index() {
        let st = state(Arc::new(ScriptedModel::new("- Namaste")));
        let Json(resp) = chat(State(st), Json(ChatRequest::new("hello")))
            .await
            .ok()
            .unwrap();
        assert_eq!(resp.response, "- Namaste");
        assert!(resp.sources.is_empty());
    }

    #[tokio::test]
    async fn test_chat_empty_message_is_400() {
        let st = state(Arc::new(ScriptedModel::new("- ok")));
        let err = chat(State(st), Json(ChatRequest::new("")))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.detail(), "Message cannot be empty");
    }

    #[tokio::test]
    async fn test_chat_llm_failure_is_500() {
        let model = Arc::new(ScriptedModel::new("- ok"));
        model.push_failure(429);
        let st = state(model);
        let err = chat(State(st), Json(ChatRequest::new("hi")))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.detail().contains("429"));
    }

    #[test]
    fn test_error_response_status() {
        let resp = ApiError::from(ChatError::EmptyMessage).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
