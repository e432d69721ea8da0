
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for document chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound, in characters, for a packed chunk
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self { max_chars: 800 }
    }
}

/// Split document text into retrieval chunks.
///
/// Lines are packed greedily into the current chunk while the combined
/// length stays under `max_chars`; a line that does not fit starts a new
/// chunk, so a single over-long line becomes a chunk of its own. Chunks are
/// trimmed and blank ones dropped.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        if current_len + line_len < config.max_chars {
            current.push_str(line);
            current.push(' ');
            current_len += line_len + 1;
        } else {
            push_chunk(&mut chunks, &current);
            current.clear();
            current.push_str(line);
            current.push(' ');
            current_len = line_len + 1;
        }
    }
    push_chunk(&mut chunks, &current);

    debug!(
        "Chunked {} characters into {} chunks",
        text.chars().count(),
        chunks.len()
    );

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
