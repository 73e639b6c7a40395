//! # localguide: travel-guide chatbot backend
//!
//! Answers tourist questions about places in India by retrieving matching
//! entries from a local knowledge base and handing them to a hosted LLM.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with defaults and validation
//! - **[`knowledge`]**: Knowledge-base file parsing and location filters
//! - **[`embedder`]**: Sentence embeddings via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`db`]**: SQLite + sqlite-vec place index (replace, search, metadata)
//! - **[`indexer`]**: Rebuilds the place index when the knowledge base changes
//! - **[`session`]**: In-memory bounded chat history per session
//! - **[`llm`]**: Chat-completion clients (Groq, scripted test double)
//! - **[`prompt`]**: System prompt and context assembly
//! - **[`chat`]**: One retrieval-augmented chat turn
//! - **[`server`]**: axum HTTP surface (`/health`, `/chat`)
//! - **[`client`]**: HTTP client with user-facing error messages
//! - **[`format`]**: Bullet/heading rendering of bot replies
//! - **[`repl`]**: Terminal chat loop with starter suggestions

pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod embedder;
pub mod format;
pub mod indexer;
pub mod knowledge;
pub mod llm;
pub mod prompt;
pub mod repl;
pub mod server;
pub mod session;
