// Retrieval pipeline
// Embed a question, pull the nearest document chunks and answer from them


use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embeddings::{EmbeddingProvider, embed_one_blocking};
use crate::generation::GenerationClient;
use crate::index::{SearchHit, SharedIndex};
use crate::{RagError, Result};

/// Default number of chunks pulled into the context
pub const DEFAULT_TOP_K: usize = 3;

/// Answer when the document index has nothing to offer
pub const NO_CONTEXT_MESSAGE: &str = "I couldn't find any relevant context in the document.";

/// Answer when the backend produced only whitespace
pub const NO_ANSWER_MESSAGE: &str = "I couldn't generate a response. Please rephrase your question.";

/// Answer when the embedding or generation models could not be reached
pub const BACKEND_FAILURE_MESSAGE: &str = "⚠️ Error: the local models could not be reached. Ensure Ollama is running via 'ollama serve' and the configured models are pulled.";

/// Answer when the query embedding does not fit the document index
pub const MODEL_MISMATCH_MESSAGE: &str = "⚠️ Error: the document was indexed with a different embedding model. Ingest it again with the current model.";

/// Answer when the persisted document index cannot be used
pub const INDEX_FAILURE_MESSAGE: &str = "⚠️ Error: the document index could not be read. Run 'docs-rag reset' and ingest the document again.";

pub const QA_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on a provided document context.
You should:
1. Understand the question deeply and carefully
2. Keep responses short (2-3 sentences max)
3. Give a comprehensive, natural, conversational answer
4. DO NOT just copy sentences from the context and Do not include explanations or introductions
5. Explain ideas clearly, in your own words
6. If context is ambiguous, clearly mention your reasoning
7. Be natural and fluent.";

/// Question answering over the document index
#[derive(Clone)]
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: SharedIndex,
    generator: Arc<GenerationClient>,
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("dimension", &self.embedder.dimension())
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl RetrievalPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: SharedIndex,
        generator: Arc<GenerationClient>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
        }
    }

    #[inline]
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Answer `query` from the `k` nearest chunks. Always returns a string:
    /// failures are turned into a message naming the likely fix.
    #[inline]
    pub async fn answer(&self, query: &str, k: usize) -> String {
        match self.try_answer(query, k).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Question answering failed: {}", e);
                failure_message(&e).to_string()
            }
        }
    }

    /// Like [`answer`](Self::answer) but surfaces retrieval errors
    #[inline]
    pub async fn try_answer(&self, query: &str, k: usize) -> Result<String> {
        let hits = self.retrieve(query, k).await?;
        if hits.is_empty() {
            info!("No relevant chunks for query");
            return Ok(NO_CONTEXT_MESSAGE.to_string());
        }

        let prompt = build_prompt(&hits, query);
        let response = self.generator.generate(&prompt, QA_SYSTEM_PROMPT).await;

        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Ok(NO_ANSWER_MESSAGE.to_string());
        }
        Ok(trimmed.to_string())
    }

    /// Embed `query` and return up to `k` nearest chunks, closest first
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let vector = embed_one_blocking(&self.embedder, query).await?;

        let hits = self.index.read().await.search(&vector, k)?;
        debug!("Retrieved {} chunks", hits.len());
        Ok(hits)
    }
}

/// Join chunk texts nearest-first, one paragraph each
#[inline]
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.record.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user-facing prompt: retrieved context followed by the question
#[inline]
pub fn build_prompt(hits: &[SearchHit], query: &str) -> String {
    format!(
        "Based on the following context from the document, answer the question clearly and conversationally.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        build_context(hits),
        query
    )
}

/// Fixed remedy for each failure; details stay in the log
fn failure_message(error: &RagError) -> &'static str {
    match error {
        RagError::DimensionMismatch { .. } => MODEL_MISMATCH_MESSAGE,
        RagError::CountMismatch { .. }
        | RagError::CorruptIndex(_)
        | RagError::Io(_)
        | RagError::Serialization(_) => INDEX_FAILURE_MESSAGE,
        RagError::Embedding(_)
        | RagError::IndexUninitialized
        | RagError::EmptyDocument(_)
        | RagError::BackendUnavailable(_)
        | RagError::MalformedStreamFragment(_)
        | RagError::Config(_)
        | RagError::Network(_)
        | RagError::Other(_) => BACKEND_FAILURE_MESSAGE,
    }
}
