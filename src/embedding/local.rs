//! In-process feature-hashing embedding model
//!
//! Tokens and adjacent token pairs are hashed into a fixed number of signed
//! buckets and the result is L2-normalised, so texts sharing vocabulary get
//! high cosine similarity. Deterministic across runs and platforms.

use super::{Deployment, EmbeddingProvider};
use crate::error::ProviderError;
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embedding computed in-process
#[derive(Debug, Clone)]
pub struct HashingEmbeddingModel {
    dimension: usize,
}

impl HashingEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(parts: &[&str]) -> u64 {
        let mut hash = FNV_OFFSET;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hash ^= 0x1f;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            for byte in part.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        hash
    }

    fn accumulate(&self, vector: &mut [f32], parts: &[&str], weight: f32) {
        let hash = Self::fnv1a(parts);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Embed synchronously
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(&mut vector, &[token.as_str()], 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut vector, &[pair[0].as_str(), pair[1].as_str()], 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingModel {
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn embedding_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn deployment(&self) -> Deployment {
        Deployment::InProcess
    }
}
