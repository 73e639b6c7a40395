/// End-to-end integration tests for the local guide backend.
///
/// Tests the complete flow:
///   Knowledge base → Indexer → DB → ChatService → HTTP handlers
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use localguide::chat::{ChatRequest, ChatService};
use localguide::client::{ApiClient, ClientError};
use localguide::config::{Config, LlmConfig};
use localguide::db::Db;
use localguide::embedder::Embedder;
use localguide::embedder::mock::MockEmbedder;
use localguide::format::{self, ReplyLine};
use localguide::indexer::{IndexOutcome, Indexer};
use localguide::llm::groq::GroqClient;
use localguide::llm::scripted::ScriptedModel;
use localguide::llm::{ChatModel, LlmError};
use localguide::server::{self, AppState};
use localguide::session::{ChatMessage, Role};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::sync::Mutex as TokioMutex;

const DIMS: usize = 384;

const KNOWLEDGE_BASE: &str = r#"{
    "Maharashtra": {
        "Mumbai": {"places": [
            {"name": "Juhu Beach", "type": "street food", "description": "pav bhaji and vada pav stalls by the sea", "location": "Juhu", "price": "INR 150", "rating": 4.3},
            {"name": "Colaba Causeway", "type": "market", "description": "street shopping for clothes and souvenirs", "location": "Colaba", "rating": 4.1}
        ]}
    },
    "Rajasthan": {
        "Jaipur": {"places": [
            {"name": "Amber Fort", "type": "fort", "description": "hilltop fort with mirror palace", "location": "Amer", "price": "INR 100", "rating": 4.7},
            {"name": "Johari Bazaar", "type": "market", "description": "jewellery and textile shopping", "location": "Old City", "rating": "4.2"}
        ]}
    }
}"#;

/// Index a temp knowledge base and wrap it in a chat service.
async fn indexed_service(model: Arc<ScriptedModel>, top_k: usize) -> (ChatService, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let kb_path = temp_dir.path().join("knowledge_base.json");
    fs::write(&kb_path, KNOWLEDGE_BASE).unwrap();

    let db_path = temp_dir.path().join("places.db");
    let db = Arc::new(TokioMutex::new(Db::open(&db_path, DIMS).unwrap()));
    let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(DIMS));

    let outcome = Indexer::new(db.clone(), embedder.as_ref())
        .index_knowledge_base(&kb_path, false)
        .await
        .unwrap();
    assert_eq!(outcome, IndexOutcome::Indexed { places: 4 });

    let service = ChatService::new(db, embedder, model, top_k, 10);
    (service, temp_dir)
}

/// Knowledge base → index → two chat turns in one session
#[tokio::test]
async fn test_full_pipeline() {
    let model = Arc::new(ScriptedModel::new("- Enjoy"));
    model.push_reply("Food:\n- Try **pav bhaji** at Juhu Beach");
    let (service, _dir) = indexed_service(model.clone(), 4).await;

    let mut first = ChatRequest::new("where can I eat pav bhaji by the sea");
    first.city = Some("mumbai".to_string());
    let resp = service.chat(first).await.unwrap();

    assert!(!resp.sources.is_empty());
    assert!(resp.sources.iter().all(|p| p.city == "Mumbai"));
    assert_eq!(
        format::format_reply(&resp.response),
        vec![
            ReplyLine::Heading("Food:".to_string()),
            ReplyLine::Bullet("Try pav bhaji at Juhu Beach".to_string()),
        ]
    );

    let second = ChatRequest::new("and something to buy?").with_session(resp.session_id.clone());
    let resp2 = service.chat(second).await.unwrap();
    assert_eq!(resp2.session_id, resp.session_id);
    assert_eq!(resp2.response, "- Enjoy");

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    let roles: Vec<Role> = calls[1].iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(calls[1][3].content.starts_with("and something to buy?\n\n"));
}

/// Re-opening the same database keeps the index and skips re-embedding
#[tokio::test]
async fn test_index_persists_across_opens() {
    let temp_dir = tempdir().unwrap();
    let kb_path = temp_dir.path().join("knowledge_base.json");
    fs::write(&kb_path, KNOWLEDGE_BASE).unwrap();
    let db_path = temp_dir.path().join("places.db");
    let embedder = MockEmbedder::new(DIMS);

    {
        let db = Arc::new(TokioMutex::new(Db::open(&db_path, DIMS).unwrap()));
        let outcome = Indexer::new(db, &embedder)
            .index_knowledge_base(&kb_path, false)
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { places: 4 });
    }

    let db = Arc::new(TokioMutex::new(Db::open(&db_path, DIMS).unwrap()));
    let outcome = Indexer::new(db.clone(), &embedder)
        .index_knowledge_base(&kb_path, false)
        .await
        .unwrap();
    assert_eq!(outcome, IndexOutcome::UpToDate { places: 4 });

    let query = embedder.embed("hilltop fort with mirror palace").unwrap();
    let hits = db.lock().await.search(&query, 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].place.name, "Amber Fort");
    assert!(hits[0].distance <= hits[1].distance);
}

/// HTTP handlers over an indexed service
#[tokio::test]
async fn test_http_handlers() {
    let model = Arc::new(ScriptedModel::new("- Visit Amber Fort early"));
    let (service, _dir) = indexed_service(model.clone(), 5).await;
    let state = AppState {
        chat: Arc::new(service),
    };

    let Json(health) = server::health().await;
    assert_eq!(health.status, "ok");

    let mut req = ChatRequest::new("forts to see");
    req.state = Some("Rajasthan".to_string());
    let Json(resp) = server::chat(State(state.clone()), Json(req))
        .await
        .ok()
        .unwrap();
    assert_eq!(resp.response, "- Visit Amber Fort early");
    assert!(resp.sources.iter().all(|p| p.state == "Rajasthan"));

    let err = server::chat(State(state.clone()), Json(ChatRequest::new("\n\t")))
        .await
        .err()
        .unwrap();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    model.push_failure(503);
    let err = server::chat(State(state), Json(ChatRequest::new("hello")))
        .await
        .err()
        .unwrap();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Config defaults and validation
#[test]
fn test_config_defaults_and_validation() {
    let config = Config::default();
    assert_eq!(config.search_top_k, 5);
    assert_eq!(config.history_limit, 10);
    assert_eq!(config.embedding.dimensions, DIMS);
    assert_eq!(config.listen_addr(), "0.0.0.0:8000");
    assert!(config.validate().is_ok());

    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"search_top_k": 0}"#).unwrap();
    let loaded = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.search_top_k, 0);
    assert!(loaded.validate().is_err());
}

/// Mock embedder: same text, same vector; unit length
#[test]
fn test_mock_embedder_consistency() {
    let embedder = MockEmbedder::new(DIMS);
    let v1 = embedder.embed("masala chai").unwrap();
    let v2 = embedder.embed("masala chai").unwrap();
    assert_eq!(v1, v2);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

/// Serve `app` on an ephemeral local port, returning its base URL
async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Real router over TCP, driven by the ApiClient
#[tokio::test]
async fn test_router_over_http() {
    let model = Arc::new(ScriptedModel::new("- Try the vada pav"));
    let (service, _dir) = indexed_service(model.clone(), 5).await;
    let state = AppState {
        chat: Arc::new(service),
    };
    let origins = vec![
        "http://localhost:3000".to_string(),
        "bad\norigin".to_string(),
    ];
    let base_url = spawn_app(server::router(state, &origins)).await;
    let client = ApiClient::new(&base_url, Duration::from_secs(10)).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.message, "Backend is running");

    let resp = client
        .send_message(&ChatRequest::new("street food in Mumbai"))
        .await
        .unwrap();
    assert_eq!(resp.response, "- Try the vada pav");
    assert!(!resp.sources.is_empty());

    let followup = client
        .send_message(&ChatRequest::new("anything sweet?").with_session(resp.session_id.clone()))
        .await
        .unwrap();
    assert_eq!(followup.session_id, resp.session_id);
    assert_eq!(model.calls()[1].len(), 4);

    let err = client
        .send_message(&ChatRequest::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 400, .. }));
    assert_eq!(err.user_message(), "Message cannot be empty");

    model.push_failure(502);
    let err = client
        .send_message(&ChatRequest::new("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
    assert!(err.user_message().starts_with("The server hit an error: "));
    assert!(err.user_message().contains("502"));
}

/// Malformed bodies are rejected by the JSON extractor
#[tokio::test]
async fn test_router_rejects_malformed_json() {
    let (service, _dir) = indexed_service(Arc::new(ScriptedModel::new("- ok")), 5).await;
    let state = AppState {
        chat: Arc::new(service),
    };
    let base_url = spawn_app(server::router(state, &[])).await;
    let http = reqwest::Client::new();

    let syntax = http
        .post(format!("{base_url}/chat"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(syntax.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing_field = http
        .post(format!("{base_url}/chat"))
        .json(&json!({"session_id": "abc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let not_found = http.get(format!("{base_url}/nope")).send().await.unwrap();
    assert_eq!(not_found.status(), reqwest::StatusCode::NOT_FOUND);
}

/// CORS preflight and exposed headers for configured origins only
#[tokio::test]
async fn test_router_cors() {
    let (service, _dir) = indexed_service(Arc::new(ScriptedModel::new("- ok")), 5).await;
    let state = AppState {
        chat: Arc::new(service),
    };
    let origins = vec!["http://localhost:3000".to_string()];
    let base_url = spawn_app(server::router(state, &origins)).await;
    let http = reqwest::Client::new();

    let preflight = http
        .request(reqwest::Method::OPTIONS, format!("{base_url}/chat"))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(
        preflight
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );

    let health = http
        .get(format!("{base_url}/health"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        health
            .headers()
            .get("access-control-expose-headers")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let foreign = http
        .request(reqwest::Method::OPTIONS, format!("{base_url}/chat"))
        .header("Origin", "http://evil.example")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert!(foreign.headers().get("access-control-allow-origin").is_none());
}

/// Stand-in for the provider's chat-completions endpoint, keyed on the bearer token
async fn fake_completions(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth {
        "Bearer good" => {
            let turns = body["messages"].as_array().map_or(0, Vec::len);
            let content = format!("  - {} got {turns} messages\n", body["model"].as_str().unwrap_or("?"));
            Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
                .into_response()
        }
        "Bearer empty" => Json(json!({"choices": []})).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Invalid API Key", "type": "invalid_request_error"}})),
        )
            .into_response(),
    }
}

/// GroqClient against a local chat-completions endpoint
#[tokio::test]
async fn test_groq_client_over_http() {
    let base_url = spawn_app(Router::new().route("/v1/chat/completions", post(fake_completions))).await;
    let cfg = LlmConfig {
        base_url: format!("{base_url}/v1"),
        timeout_secs: 10,
        ..LlmConfig::default()
    };
    let messages = [ChatMessage::system("be brief"), ChatMessage::user("hi")];

    let good = GroqClient::new(&cfg, "good".to_string()).unwrap();
    assert_eq!(
        good.complete(&messages).await.unwrap(),
        "- llama-3.1-8b-instant got 2 messages"
    );

    let unauthorized = GroqClient::new(&cfg, "wrong".to_string()).unwrap();
    match unauthorized.complete(&messages).await {
        Err(LlmError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid API Key");
        }
        other => panic!("expected API error, got {other:?}"),
    }

    let empty = GroqClient::new(&cfg, "empty".to_string()).unwrap();
    assert!(matches!(
        empty.complete(&messages).await,
        Err(LlmError::EmptyResponse)
    ));
}
