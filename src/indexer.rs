//! Builds the place index from the knowledge-base file.
//!
//! The index is rebuilt only when the file's path or modification time
//! changed since the last run, unless forced.
use crate::db::Db;
use crate::embedder::Embedder;
use crate::knowledge;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { places: usize },
    UpToDate { places: usize },
}

impl IndexOutcome {
    #[must_use]
    pub fn places(&self) -> usize {
        match *self {
            Self::Indexed { places } | Self::UpToDate { places } => places,
        }
    }
}

pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: &'a E) -> Self {
        Self { db, embedder }
    }

    /// Index the knowledge-base file at `path`.
    pub async fn index_knowledge_base<P: AsRef<Path>>(
        &mut self,
        path: P,
        force: bool,
    ) -> Result<IndexOutcome> {
        let path = path.as_ref();
        let source = path.to_string_lossy().replace('\\', "/");

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("{} not found", path.display()))?;
        let mod_time: DateTime<Utc> = metadata.modified()?.into();

        let index_dims = self.db.lock().await.dimensions();
        anyhow::ensure!(
            self.embedder.dimensions() == index_dims,
            "embedder produces {} dimensions but the index expects {index_dims}",
            self.embedder.dimensions(),
        );

        if !force {
            let db = self.db.lock().await;
            if let Some(meta) = db.index_meta()? {
                if meta.source == source && meta.modified_at == mod_time {
                    info!("Index is up to date ({} places)", meta.place_count);
                    return Ok(IndexOutcome::UpToDate {
                        places: meta.place_count,
                    });
                }
            }
        }

        let places = knowledge::load_knowledge_base(path)?;
        for (state, count) in knowledge::places_per_state(&places) {
            info!("  {state}: {count} places");
        }

        let texts: Vec<String> = places.iter().map(|p| p.embedding_text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self
            .embedder
            .embed_batch(&text_refs)
            .context("failed to embed knowledge base")?;

        {
            let mut db = self.db.lock().await;
            db.replace_places(&places, &vectors, &source, mod_time)
                .context("failed to write place index")?;
        }

        info!("Indexed {} places from {source}", places.len());
        Ok(IndexOutcome::Indexed {
            places: places.len(),
        })
    }
}
