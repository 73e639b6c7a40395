/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected by configuration.
///
/// For the ONNX backend, missing model files are downloaded first.
pub fn from_config(cfg: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match cfg.backend {
        EmbeddingBackend::Mock => {
            info!("Using mock embedder ({} dimensions)", cfg.dimensions);
            Ok(Arc::new(mock::MockEmbedder::new(cfg.dimensions)))
        }
        EmbeddingBackend::Onnx => {
            let model_dir = Path::new(&cfg.model_dir);
            download::download_model_files(model_dir)?;
            let embedder = onnx::OnnxEmbedder::new(model_dir)?;
            anyhow::ensure!(
                embedder.dimensions() == cfg.dimensions,
                "embedding.dimensions is {} but the model produces {}",
                cfg.dimensions,
                embedder.dimensions()
            );
            Ok(Arc::new(embedder))
        }
    }
}
