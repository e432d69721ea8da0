// Embeddings module
// Text-to-vector providers, output shape normalization and document chunking

pub mod chunking;
pub mod hashing;
pub mod ollama;


use serde::Deserialize;
use std::sync::Arc;

use crate::{RagError, Result};

pub use chunking::{ChunkingConfig, chunk_text};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

/// A fixed-dimension embedding vector
pub type Vector = Vec<f32>;

/// Converts text into fixed-dimension vectors.
///
/// Implementations must be stateless per call: the same provider instance is
/// shared by document retrieval and the semantic response cache.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text, preserving order. An empty input yields an empty output.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Embed a single string
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed(&[text.to_string()])?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(RagError::Embedding(
                "expected exactly one vector for a single input".to_string(),
            )),
        }
    }

    /// Output dimension, when known before the first call
    fn dimension(&self) -> Option<usize>;
}

/// Embedding output as a model may hand it back: a single vector, a batch of
/// vectors, or a batch wrapped in another single-element list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawEmbedding {
    Flat(Vec<f32>),
    Batch(Vec<Vec<f32>>),
    Nested(Vec<Vec<Vec<f32>>>),
}

/// Flatten raw model output into exactly `expected` vectors of uniform dimension.
///
/// Null, empty, ragged or non-finite output is an [`RagError::Embedding`];
/// asking for zero vectors is the only way to get an empty result.
#[inline]
pub fn normalize_embeddings(raw: RawEmbedding, expected: usize) -> Result<Vec<Vector>> {
    let vectors = match raw {
        RawEmbedding::Flat(vector) => vec![vector],
        RawEmbedding::Batch(batch) => batch,
        RawEmbedding::Nested(mut nested) => {
            if nested.len() == 1 {
                nested.pop().unwrap_or_default()
            } else if nested.iter().all(|inner| inner.len() == 1) {
                nested.into_iter().flatten().collect()
            } else {
                return Err(RagError::Embedding(format!(
                    "ambiguous nested embedding output with {} batches",
                    nested.len()
                )));
            }
        }
    };

    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "model returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }

    let Some(dimension) = vectors.first().map(Vec::len) else {
        return Ok(vectors);
    };

    if dimension == 0 {
        return Err(RagError::Embedding("model returned an empty vector".to_string()));
    }

    for vector in &vectors {
        if vector.len() != dimension {
            return Err(RagError::Embedding(format!(
                "ragged embedding output: {} vs {} dimensions",
                vector.len(),
                dimension
            )));
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(RagError::Embedding(
                "model returned non-finite values".to_string(),
            ));
        }
    }

    Ok(vectors)
}

/// Embed `texts` on the blocking pool so providers doing synchronous I/O
/// never stall the async runtime
#[inline]
pub async fn embed_blocking(
    embedder: &Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
) -> Result<Vec<Vector>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed(&texts))
        .await
        .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
}

/// Single-text form of [`embed_blocking`]
#[inline]
pub async fn embed_one_blocking(
    embedder: &Arc<dyn EmbeddingProvider>,
    text: &str,
) -> Result<Vector> {
    let embedder = Arc::clone(embedder);
    let text = text.to_string();
    tokio::task::spawn_blocking(move || embedder.embed_one(&text))
        .await
        .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
}
