//! Configuration validation

use super::*;
use crate::error::{Result, TreeError};

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.embedding.models.is_empty() {
        return Err(TreeError::Config(
            "At least one embedding model must be configured".to_string(),
        ));
    }

    for (name, model) in &config.embedding.models {
        validate_embedding_model(name, model)?;
    }

    validate_summarization_config(&config.summarization)?;
    validate_retry_config(&config.retry)?;
    validate_builder_config(&config.builder)?;
    validate_retriever_config(&config.retriever)?;

    for name in &config.builder.embedding_models {
        if !config.embedding.models.contains_key(name) {
            return Err(TreeError::Config(format!(
                "Builder references unknown embedding model '{}'",
                name
            )));
        }
    }

    if !config
        .builder
        .embedding_models
        .contains(&config.retriever.context_embedding_model)
    {
        return Err(TreeError::Config(format!(
            "Context embedding model '{}' is not embedded by the builder",
            config.retriever.context_embedding_model
        )));
    }

    Ok(())
}

fn validate_url(url: &str, what: &str) -> Result<()> {
    if url.is_empty() {
        return Err(TreeError::Config(format!("{} URL cannot be empty", what)));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(TreeError::Config(format!(
            "{} URL must start with http:// or https://",
            what
        )));
    }

    Ok(())
}

/// Validate one embedding model entry
fn validate_embedding_model(name: &str, model: &EmbeddingModelConfig) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TreeError::Config(
            "Embedding model names cannot be empty".to_string(),
        ));
    }

    match model {
        EmbeddingModelConfig::Remote(remote) => {
            validate_url(&remote.api_url, "Embedding API")?;

            if remote.api_token.expose_secret().is_empty() {
                return Err(TreeError::Config(format!(
                    "Embedding API token is required for model '{}'",
                    name
                )));
            }

            if remote.batch_size == 0 || remote.batch_size > 2048 {
                return Err(TreeError::Config(
                    "Embedding batch size must be between 1 and 2048".to_string(),
                ));
            }

            if remote.timeout_secs == 0 || remote.timeout_secs > 300 {
                return Err(TreeError::Config(
                    "Embedding timeout must be between 1 and 300 seconds".to_string(),
                ));
            }

            if remote.dimension == Some(0) {
                return Err(TreeError::Config(
                    "Embedding dimension must be greater than 0".to_string(),
                ));
            }

            if remote.cache_enabled && (remote.cache_size == 0 || remote.cache_ttl_secs == 0) {
                return Err(TreeError::Config(
                    "Cache size and TTL must be greater than 0 when cache is enabled".to_string(),
                ));
            }
        }
        EmbeddingModelConfig::Local(local) => {
            if local.dimension == 0 {
                return Err(TreeError::Config(
                    "Local embedding dimension must be greater than 0".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validate summarization configuration
fn validate_summarization_config(config: &SummarizationConfig) -> Result<()> {
    if let SummarizationConfig::Remote(remote) = config {
        validate_url(&remote.api_url, "Summarization API")?;

        if remote.api_token.expose_secret().is_empty() {
            return Err(TreeError::Config(
                "Summarization API token is required".to_string(),
            ));
        }

        if remote.model.is_empty() {
            return Err(TreeError::Config(
                "Summarization model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&remote.temperature) {
            return Err(TreeError::Config(
                "Summarization temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
    }

    if config.max_input_tokens() == 0 {
        return Err(TreeError::Config(
            "Summarization input budget must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate retry configuration
pub fn validate_retry_config(config: &RetryConfig) -> Result<()> {
    if config.max_attempts == 0 || config.max_attempts > 10 {
        return Err(TreeError::Config(
            "Retry attempts must be between 1 and 10".to_string(),
        ));
    }

    if config.multiplier < 1.0 {
        return Err(TreeError::Config(
            "Backoff multiplier must be at least 1.0".to_string(),
        ));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(TreeError::Config(
            "Initial backoff cannot exceed maximum backoff".to_string(),
        ));
    }

    Ok(())
}

fn validate_token_estimator(estimator: &TokenEstimator) -> Result<()> {
    let ratio = match estimator {
        TokenEstimator::CharacterBased { chars_per_token } => *chars_per_token,
        TokenEstimator::WordBased { words_per_token } => *words_per_token,
    };

    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(TreeError::Config(
            "Token estimator ratio must be a positive number".to_string(),
        ));
    }

    Ok(())
}

/// Validate tree builder configuration
pub fn validate_builder_config(config: &TreeBuilderConfig) -> Result<()> {
    if config.max_tokens == 0 {
        return Err(TreeError::Config(
            "Chunk max_tokens must be greater than 0".to_string(),
        ));
    }

    if config.top_k == 0 {
        return Err(TreeError::Config(
            "Builder top_k must be greater than 0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.threshold) {
        return Err(TreeError::Config(format!(
            "Builder threshold must be within [0, 1], got {}",
            config.threshold
        )));
    }

    if config.summarization_length == 0 {
        return Err(TreeError::Config(
            "Summarization length must be greater than 0".to_string(),
        ));
    }

    if config.embedding_models.is_empty() {
        return Err(TreeError::Config(
            "Builder needs at least one embedding model".to_string(),
        ));
    }

    if !config
        .embedding_models
        .contains(&config.cluster_embedding_model)
    {
        return Err(TreeError::Config(format!(
            "Cluster embedding model '{}' must be one of the builder's embedding models",
            config.cluster_embedding_model
        )));
    }

    if config.workers == 0 {
        return Err(TreeError::Config(
            "Worker count must be greater than 0".to_string(),
        ));
    }

    let clustering = &config.clustering;
    if clustering.reduction_dimension == 0 {
        return Err(TreeError::Config(
            "Reduction dimension must be greater than 0".to_string(),
        ));
    }

    if clustering.max_clusters == 0 {
        return Err(TreeError::Config(
            "max_clusters must be greater than 0".to_string(),
        ));
    }

    if clustering.max_iter == 0 {
        return Err(TreeError::Config(
            "max_iter must be greater than 0".to_string(),
        ));
    }

    validate_token_estimator(&config.token_estimator)
}

/// Validate tree retriever configuration
pub fn validate_retriever_config(config: &TreeRetrieverConfig) -> Result<()> {
    if config.top_k == 0 {
        return Err(TreeError::Config(
            "Retriever top_k must be greater than 0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.threshold) {
        return Err(TreeError::Config(format!(
            "Retriever threshold must be within [0, 1], got {}",
            config.threshold
        )));
    }

    if config.max_tokens == 0 {
        return Err(TreeError::Config(
            "Retriever max_tokens must be greater than 0".to_string(),
        ));
    }

    if config.num_layers == Some(0) {
        return Err(TreeError::Config(
            "Traversal depth must be greater than 0".to_string(),
        ));
    }

    if config.context_embedding_model.is_empty() {
        return Err(TreeError::Config(
            "Context embedding model cannot be empty".to_string(),
        ));
    }

    validate_token_estimator(&config.token_estimator)
}
