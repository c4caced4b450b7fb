//! Embedding cache for network-backed models using moka

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

/// Async cache of text -> vector, keyed by a SHA-256 digest of the text
pub struct EmbeddingCache {
    cache: Cache<String, Vec<f32>>,
}

impl EmbeddingCache {
    /// Create a new cache with specified capacity and TTL
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        info!("Initializing embedding cache with max_size={}, ttl={:?}", max_size, ttl);

        let cache = Cache::builder()
            .max_capacity(max_size as u64)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    fn key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("emb_{}", hex::encode(hasher.finalize()))
    }

    /// Get embedding from cache
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(&Self::key(text)).await;
        if result.is_some() {
            debug!("Embedding cache hit");
        }
        result
    }

    /// Store embedding in cache
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        self.cache.insert(Self::key(text), embedding).await;
    }

    /// Number of live entries after pending maintenance
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
