//! Uniform, retrying access to named embedding models

use super::{provider_from_config, EmbeddingProvider};
use crate::config::{EmbeddingConfig, RetryConfig};
use crate::error::{ProviderError, Result, TreeError};
use crate::retry::RetryPolicy;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// Named embedding providers sharing one retry policy
#[derive(Clone)]
pub struct EmbeddingGateway {
    models: IndexMap<String, Arc<dyn EmbeddingProvider>>,
    retry: RetryPolicy,
}

impl EmbeddingGateway {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            models: IndexMap::new(),
            retry,
        }
    }

    /// Register a provider under `name`, replacing any previous one
    pub fn with_model(mut self, name: impl Into<String>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.models.insert(name.into(), provider);
        self
    }

    /// Instantiate every configured model
    pub fn from_config(config: &EmbeddingConfig, retry: &RetryConfig) -> Result<Self> {
        let mut gateway = Self::new(RetryPolicy::new(retry));
        for (name, model) in &config.models {
            gateway = gateway.with_model(name.clone(), provider_from_config(model)?);
        }
        Ok(gateway)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Resolve `name` once into a handle that needs no further lookups
    pub fn bind(&self, name: &str) -> Result<BoundEmbedder> {
        let provider = self
            .models
            .get(name)
            .ok_or_else(|| TreeError::Config(format!("Unknown embedding model '{}'", name)))?;

        Ok(BoundEmbedder {
            name: Arc::from(name),
            provider: provider.clone(),
            retry: provider.deployment().policy(&self.retry),
        })
    }

    /// Embed `texts` with the model called `model_name`, one vector per text
    pub async fn embed(&self, texts: &[String], model_name: &str) -> Result<Vec<Vec<f32>>> {
        self.bind(model_name)?.embed_batch(texts).await
    }
}

/// One embedding model resolved from the gateway
#[derive(Clone)]
pub struct BoundEmbedder {
    name: Arc<str>,
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl BoundEmbedder {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Providers see text with line breaks flattened to spaces
    fn normalize(text: &str) -> String {
        text.replace(['\r', '\n'], " ")
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = Self::normalize(text);
        let operation = format!("embedding with '{}'", self.name);
        let vector = self
            .retry
            .run(&operation, || self.provider.embed_single(&text))
            .await?;
        self.check_dimension(std::slice::from_ref(&vector))?;
        Ok(vector)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = texts.iter().map(|t| Self::normalize(t)).collect();
        let operation = format!("batch embedding with '{}'", self.name);
        let vectors = self
            .retry
            .run(&operation, || self.provider.embed_batch(&texts))
            .await?;

        if vectors.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "Model '{}' returned {} vectors for {} texts",
                self.name,
                vectors.len(),
                texts.len()
            ))
            .into());
        }
        self.check_dimension(&vectors)?;

        debug!("Embedded {} texts with '{}'", texts.len(), self.name);
        Ok(vectors)
    }

    fn check_dimension(&self, vectors: &[Vec<f32>]) -> Result<()> {
        let expected = match self.provider.embedding_dimension() {
            Some(dim) => dim,
            None => match vectors.first() {
                Some(first) => first.len(),
                None => return Ok(()),
            },
        };

        match vectors.iter().find(|v| v.len() != expected) {
            Some(bad) => Err(ProviderError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }
            .into()),
            None => Ok(()),
        }
    }
}
