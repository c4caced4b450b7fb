//! Summarization providers and the gateway used by the tree builder

pub mod client;
pub mod extractive;
pub mod gateway;
pub mod models;

pub use client::RemoteSummarizationClient;
pub use extractive::ExtractiveSummarizer;
pub use gateway::SummarizerGateway;

use crate::chunking::TokenEstimator;
use crate::config::SummarizationConfig;
use crate::error::{ProviderError, Result};
use crate::retry::Deployment;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for summarization providers
#[async_trait]
pub trait SummarizationProvider: Send + Sync {
    /// Summarize `context` in at most `max_tokens` output tokens
    async fn summarize(&self, context: &str, max_tokens: usize) -> std::result::Result<String, ProviderError>;

    fn deployment(&self) -> Deployment;
}

/// Build the provider described by the configuration
pub fn provider_from_config(
    config: &SummarizationConfig,
    estimator: TokenEstimator,
) -> Result<Arc<dyn SummarizationProvider>> {
    Ok(match config {
        SummarizationConfig::Remote(remote) => Arc::new(RemoteSummarizationClient::new(remote.clone())?),
        SummarizationConfig::Extractive(_) => Arc::new(ExtractiveSummarizer::new(estimator)),
    })
}
