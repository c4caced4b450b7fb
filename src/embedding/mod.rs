//! Embedding providers and the gateway that binds them by name

pub mod cache;
pub mod client;
pub mod gateway;
pub mod local;
pub mod models;

pub use cache::EmbeddingCache;
pub use client::RemoteEmbeddingClient;
pub use gateway::{BoundEmbedder, EmbeddingGateway};
pub use local::HashingEmbeddingModel;
pub use models::{EmbeddingInput, EmbeddingRequest, EmbeddingResponse};

pub use crate::retry::Deployment;

use crate::config::EmbeddingModelConfig;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed_single(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_single(text).await?);
        }
        Ok(vectors)
    }

    /// Dimension of embeddings, when known up front
    fn embedding_dimension(&self) -> Option<usize>;

    fn deployment(&self) -> Deployment;
}

/// Build the provider described by one configuration entry
pub fn provider_from_config(config: &EmbeddingModelConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config {
        EmbeddingModelConfig::Remote(remote) => Arc::new(RemoteEmbeddingClient::new(remote.clone())?),
        EmbeddingModelConfig::Local(local) => Arc::new(HashingEmbeddingModel::new(local.dimension)),
    })
}
