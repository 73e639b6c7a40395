use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex as TokioMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use localguide::chat::ChatService;
use localguide::client::ApiClient;
use localguide::config::{Config, EmbeddingBackend};
use localguide::db::Db;
use localguide::embedder::{self, Embedder};
use localguide::indexer::{IndexOutcome, Indexer};
use localguide::llm::groq::GroqClient;
use localguide::repl;
use localguide::server::{self, AppState};

#[derive(Parser)]
#[command(name = "localguide", version, about = "Travel-guide chatbot backend")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Use the hash-based embedder instead of the ONNX model
    #[arg(long, global = true)]
    mock_embedder: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the index if needed and start the HTTP server (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Rebuild the place index from the knowledge base
    Index {
        /// Re-embed even if the knowledge base is unchanged
        #[arg(long)]
        force: bool,
    },
    /// Chat in this terminal without a server
    Repl,
    /// Chat with a running server
    Client {
        /// Server base URL (defaults to client.base_url)
        #[arg(long)]
        url: Option<String>,
    },
    /// Check that a running server answers
    Health {
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    Config::load_env_file(&cli.config)?;
    let mut config = Config::load(&cli.config)?;
    if cli.mock_embedder {
        config.embedding.backend = EmbeddingBackend::Mock;
    }

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            serve(config).await
        }
        Command::Index { force } => {
            config.validate()?;
            let (db, embedder) = open_index(&config).await?;
            let outcome = build_index(&config, db, embedder.as_ref(), force).await?;
            println!("{} places in the index", outcome.places());
            Ok(())
        }
        Command::Repl => {
            config.validate()?;
            let chat = build_chat_service(&config).await?;
            let stdin = std::io::stdin();
            repl::run(&chat, stdin.lock(), std::io::stdout()).await
        }
        Command::Client { url } => {
            let client = api_client(&config, url)?;
            info!("Chatting with {}", client.base_url());
            let stdin = std::io::stdin();
            repl::run(&client, stdin.lock(), std::io::stdout()).await
        }
        Command::Health { url } => {
            let client = api_client(&config, url)?;
            match client.health().await {
                Ok(h) => {
                    println!("{}: {}", h.status, h.message);
                    Ok(())
                }
                Err(e) => anyhow::bail!(e.user_message()),
            }
        }
    }
}

fn api_client(config: &Config, url: Option<String>) -> Result<ApiClient> {
    let url = url.unwrap_or_else(|| config.client.base_url.clone());
    ApiClient::new(&url, Duration::from_secs(config.client.timeout_secs))
        .map_err(|e| anyhow::anyhow!(e.user_message()))
}

/// Open the database and load the embedder.
async fn open_index(config: &Config) -> Result<(Arc<TokioMutex<Db>>, Arc<dyn Embedder>)> {
    let embedding_cfg = config.embedding.clone();
    // Model download and session setup block; keep them off the runtime.
    let embedder = tokio::task::spawn_blocking(move || embedder::from_config(&embedding_cfg))
        .await
        .context("embedder setup task panicked")??;

    let db = Db::open(&config.db_path, config.embedding.dimensions)
        .with_context(|| format!("failed to open database {}", config.db_path))?;
    info!("Using index at {}", config.db_path);

    Ok((Arc::new(TokioMutex::new(db)), embedder))
}

async fn build_index(
    config: &Config,
    db: Arc<TokioMutex<Db>>,
    embedder: &dyn Embedder,
    force: bool,
) -> Result<IndexOutcome> {
    let mut indexer = Indexer::new(db, embedder);
    indexer
        .index_knowledge_base(&config.knowledge_file, force)
        .await
}

async fn build_chat_service(config: &Config) -> Result<ChatService> {
    let api_key = config.api_key()?;
    let (db, embedder) = open_index(config).await?;
    build_index(config, db.clone(), embedder.as_ref(), false).await?;

    let model = GroqClient::new(&config.llm, api_key).context("failed to build LLM client")?;
    info!("Using model {}", config.llm.model);

    Ok(ChatService::new(
        db,
        embedder,
        Arc::new(model),
        config.search_top_k,
        config.history_limit,
    ))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting local guide backend...");
    let chat = build_chat_service(&config).await?;
    let state = AppState {
        chat: Arc::new(chat),
    };
    server::serve(&config.listen_addr(), state, &config.server.allowed_origins).await
}
