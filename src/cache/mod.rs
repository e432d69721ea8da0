// Response caches
// An exact prompt-hash cache and a similarity cache backed by a vector index


use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Result;
use crate::embeddings::{EmbeddingProvider, embed_one_blocking};
use crate::index::{Record, VectorIndex};

/// Cache key for a (system instructions, prompt) pair: hex SHA-256 of `system:prompt`
#[inline]
pub fn prompt_key(system: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update(b":");
    hasher.update(prompt.as_bytes());

    let mut key = String::with_capacity(64);
    for byte in hasher.finalize() {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}

/// Session-lifetime exact-match cache; never evicts
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<String, String>,
}

impl ResponseCache {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[inline]
    pub fn insert(&mut self, key: String, response: String) {
        self.entries.insert(key, response);
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.is_empty()
    }

    /// Answer stored for the nearest previous prompt, if any
    #[inline]
    pub async fn lookup(&self, prompt: &str) -> Option<String> {
        if self.is_empty().await {
            return None;
        }

        let query = match embed_one_blocking(&self.embedder, prompt).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Semantic cache lookup skipped: {}", e);
                return None;
            }
        };

        let searched = self.index.lock().await.search(&query, 1);
        let hit = match searched {
            Ok(mut hits) => hits.pop()?,
            Err(e) => {
                warn!("Semantic cache search failed: {}", e);
                return None;
            }
        };

        if let Some(max_distance) = self.max_distance {
            if hit.distance > max_distance {
                debug!(
                    "Nearest cached prompt too far ({} > {})",
                    hit.distance, max_distance
                );
                return None;
            }
        }

        if hit.record.text.is_empty() {
            return None;
        }

        debug!("Semantic cache hit at distance {}", hit.distance);
        Some(hit.record.text)
    }

    /// Remember `answer` for `prompt`. Returns whether the entry was written.
    #[inline]
    pub async fn store(&self, prompt: &str, answer: &str) -> bool {
        let vector = match embed_one_blocking(&self.embedder, prompt).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Skipping semantic cache store: {}", e);
                return false;
            }
        };

        let added = self.index.lock().await.add(vector, Record::new(answer));
        match added {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping semantic cache store: {}", e);
                false
            }
        }
    }

    /// Drop every cached answer and its persisted files
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        self.index.lock().await.reset()
    }
}
