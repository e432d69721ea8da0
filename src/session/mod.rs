// Document session
// Tracks the current document and keeps the document index in step with it


use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::{ChunkingConfig, EmbeddingProvider, chunk_text, embed_blocking};
use crate::index::{Record, SharedIndex, VectorIndex};
use crate::{RagError, Result};

/// The document currently loaded for chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub text: String,
}

/// What [`DocumentSession::ingest`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed {
        name: String,
        text_length: usize,
        chunks: usize,
    },
    /// Same document name with a live index; nothing was reprocessed
    AlreadyIndexed { name: String },
}

/// Owns the current document and the document index built from it.
///
/// The document is persisted next to the index so a later process can still
/// summarize or outline it.
pub struct DocumentSession {
    path: PathBuf,
    index: SharedIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    document: Option<Document>,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("path", &self.path)
            .field("document", &self.document.as_ref().map(|d| &d.name))
            .finish_non_exhaustive()
    }
}

impl DocumentSession {
    /// Open the session stored under the configured data directory
    #[inline]
    pub fn open(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index = VectorIndex::open(config.document_index_path())?;
        Self::new(
            config.document_path(),
            Arc::new(RwLock::new(index)),
            embedder,
            config.chunking.clone(),
        )
    }

    /// Build a session from parts, loading any document saved at `path`
    #[inline]
    pub fn new<P: AsRef<Path>>(
        path: P,
        index: SharedIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = load_document(&path)?;
        if let Some(document) = &document {
            debug!("Loaded document '{}' from {}", document.name, path.display());
        }

        Ok(Self {
            path,
            index,
            embedder,
            chunking,
            document,
        })
    }

    #[inline]
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    #[inline]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    #[inline]
    pub fn document_text(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.text.as_str())
    }

    #[inline]
    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Chunk, embed and index `text` as the current document.
    ///
    /// Re-ingesting the document that is already indexed is a no-op. Text
    /// that is empty after trimming is rejected and leaves the session as is.
    #[inline]
    pub async fn ingest(&mut self, name: &str, text: &str) -> Result<IngestOutcome> {
        let already_indexed = self.index.read().await.is_initialized();
        if already_indexed && self.document.as_ref().is_some_and(|d| d.name == name) {
            info!("Skipping reprocessing, '{}' already indexed", name);
            return Ok(IngestOutcome::AlreadyIndexed {
                name: name.to_string(),
            });
        }

        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument(name.to_string()));
        }

        let chunks = chunk_text(text, &self.chunking);
        info!("Split '{}' into {} chunks", name, chunks.len());

        let vectors = embed_blocking(&self.embedder, chunks.clone()).await?;

        let records = chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| {
                Record::new(chunk)
                    .with_metadata("document", serde_json::json!(name))
                    .with_metadata("chunk_index", serde_json::json!(position))
            })
            .collect::<Vec<_>>();
        let chunk_count = records.len();

        self.index.write().await.create_index(vectors, records)?;

        let document = Document {
            name: name.to_string(),
            text: text.to_string(),
        };
        save_document(&self.path, &document)?;
        self.document = Some(document);

        Ok(IngestOutcome::Indexed {
            name: name.to_string(),
            text_length: text.chars().count(),
            chunks: chunk_count,
        })
    }

    /// Forget the current document and wipe the index
    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        self.index.write().await.reset()?;
        self.document = None;

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Document session reset");
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<Option<Document>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn save_document(path: &Path, document: &Document) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(document)?)?;
    Ok(())
}
