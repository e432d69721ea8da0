use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, Vector};
use crate::Result;

/// Deterministic in-process embedder based on signed feature hashing.
///
/// Each lowercase word and each word bigram is hashed into one of
/// `dimension` buckets; the result is L2-normalized so squared Euclidean
/// distance tracks cosine similarity. Texts without any word map to the zero
/// vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vector {
        let mut vector = vec![0.0_f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();

        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0_u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = u64::from_le_bytes(bucket_bytes) % self.dimension as u64;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket as usize] += sign * weight;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}
