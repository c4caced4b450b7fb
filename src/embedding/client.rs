//! Network-backed embedding model speaking the OpenAI embeddings protocol

use super::{models::*, Deployment, EmbeddingCache, EmbeddingProvider};
use crate::config::RemoteEmbeddingConfig;
use crate::error::{ProviderError, Result, TreeError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// HTTP embedding client.
///
/// Each call is a single attempt; the gateway owns retries.
pub struct RemoteEmbeddingClient {
    config: RemoteEmbeddingConfig,
    http_client: Client,
    cache: Option<Arc<EmbeddingCache>>,
}

impl RemoteEmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: RemoteEmbeddingConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TreeError::Provider(ProviderError::Network(e)))?;

        Ok(Self::with_http_client(config, http_client))
    }

    /// Create client with custom HTTP client
    pub fn with_http_client(config: RemoteEmbeddingConfig, http_client: Client) -> Self {
        let cache = if config.cache_enabled {
            Some(Arc::new(EmbeddingCache::new(
                config.cache_size,
                Duration::from_secs(config.cache_ttl_secs),
            )))
        } else {
            None
        };

        info!(
            "Initialized embedding client for {} (cache_enabled={})",
            config.api_url, config.cache_enabled
        );

        Self {
            config,
            http_client,
            cache,
        }
    }

    /// Send one request and map HTTP failures onto provider errors
    async fn make_request(&self, request: &EmbeddingRequest) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Embedding API error {}: {}", status, error_text);

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed,
                _ => ProviderError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let vectors = body.into_ordered(request.len()).ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "Expected {} embeddings with indices 0..{}",
                request.len(),
                request.len()
            ))
        })?;

        if let Some(expected) = self.config.dimension {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(ProviderError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingClient {
    async fn embed_single(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text).await {
                return Ok(cached);
            }
        }

        let request = EmbeddingRequest::single(text, self.config.model.clone());
        let embedding = self
            .make_request(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No embedding in response".to_string()))?;

        if let Some(cache) = &self.cache {
            cache.put(text, embedding.clone()).await;
        }

        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let mut batch_results: Vec<Option<Vec<f32>>> = vec![None; chunk.len()];
            let mut uncached_texts = Vec::new();
            let mut uncached_indices = Vec::new();

            for (i, text) in chunk.iter().enumerate() {
                let cached = match &self.cache {
                    Some(cache) => cache.get(text).await,
                    None => None,
                };
                match cached {
                    Some(embedding) => batch_results[i] = Some(embedding),
                    None => {
                        uncached_texts.push(text.clone());
                        uncached_indices.push(i);
                    }
                }
            }

            if !uncached_texts.is_empty() {
                debug!("Requesting {} embeddings ({} cached)", uncached_texts.len(), chunk.len() - uncached_texts.len());
                let request = EmbeddingRequest::batch(uncached_texts.clone(), self.config.model.clone());
                let vectors = self.make_request(&request).await?;

                for ((index, text), embedding) in uncached_indices.into_iter().zip(&uncached_texts).zip(vectors) {
                    if let Some(cache) = &self.cache {
                        cache.put(text, embedding.clone()).await;
                    }
                    batch_results[index] = Some(embedding);
                }
            }

            for embedding in batch_results {
                results.push(embedding.ok_or_else(|| {
                    ProviderError::InvalidResponse("Missing embedding in batch".to_string())
                })?);
            }
        }

        Ok(results)
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.config.dimension
    }

    fn deployment(&self) -> Deployment {
        Deployment::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config(url: String, cache_enabled: bool) -> RemoteEmbeddingConfig {
        RemoteEmbeddingConfig {
            api_url: url,
            api_token: Secret::new("test-token".to_string()),
            model: Some("test-model".to_string()),
            dimension: Some(3),
            batch_size: 2,
            timeout_secs: 5,
            cache_enabled,
            cache_ttl_secs: 60,
            cache_size: 100,
        }
    }

    #[tokio::test]
    async fn test_batch_request_is_split_and_ordered() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer test-token")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({ "input": ["a", "b"] })))
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[0,1,0],"index":1},{"embedding":[1,0,0],"index":0}]}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/v1/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({ "input": ["c"] })))
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[0,0,1],"index":0}]}"#)
            .create_async()
            .await;

        let client = RemoteEmbeddingClient::new(config(format!("{}/v1/embeddings", server.url()), false)).unwrap();
        let vectors = client
            .embed_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_cached_text_is_not_requested_twice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1,2,3],"index":0}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = RemoteEmbeddingClient::new(config(format!("{}/v1/embeddings", server.url()), true)).unwrap();
        let a = client.embed_single("same").await.unwrap();
        let b = client.embed_single("same").await.unwrap();

        assert_eq!(a, b);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = RemoteEmbeddingClient::new(config(format!("{}/v1/embeddings", server.url()), false)).unwrap();
        let err = client.embed_single("x").await.unwrap_err();

        assert!(matches!(err, ProviderError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1,2],"index":0}]}"#)
            .create_async()
            .await;

        let client = RemoteEmbeddingClient::new(config(format!("{}/v1/embeddings", server.url()), false)).unwrap();
        let err = client.embed_single("x").await.unwrap_err();

        assert!(matches!(err, ProviderError::DimensionMismatch { expected: 3, actual: 2 }));
    }
}
