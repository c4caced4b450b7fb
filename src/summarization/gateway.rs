//! Retrying summarization with prompt assembly and input truncation

use super::{provider_from_config, SummarizationProvider};
use crate::chunking::TokenEstimator;
use crate::config::{RetryConfig, SummarizationConfig};
use crate::error::Result;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single summarization entry point used by the tree builder
#[derive(Clone)]
pub struct SummarizerGateway {
    provider: Arc<dyn SummarizationProvider>,
    retry: RetryPolicy,
    max_input_tokens: usize,
    estimator: TokenEstimator,
}

impl SummarizerGateway {
    pub fn new(
        provider: Arc<dyn SummarizationProvider>,
        retry: RetryPolicy,
        max_input_tokens: usize,
        estimator: TokenEstimator,
    ) -> Self {
        let retry = provider.deployment().policy(&retry);
        Self {
            provider,
            retry,
            max_input_tokens,
            estimator,
        }
    }

    pub fn from_config(
        config: &SummarizationConfig,
        retry: &RetryConfig,
        estimator: TokenEstimator,
    ) -> Result<Self> {
        Ok(Self::new(
            provider_from_config(config, estimator)?,
            RetryPolicy::new(retry),
            config.max_input_tokens(),
            estimator,
        ))
    }

    /// Context passed to the provider: every text on one line, texts separated
    /// by a blank line, truncated to the input budget
    pub fn build_context(&self, texts: &[String]) -> String {
        let context = texts
            .iter()
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n\n");

        let truncated = self.estimator.truncate(&context, self.max_input_tokens);
        if truncated.len() < context.len() {
            warn!(
                "Summarization input truncated from {} to {} tokens",
                self.estimator.estimate(&context),
                self.estimator.estimate(truncated)
            );
        }
        truncated.to_string()
    }

    /// Summarize `texts` as a group in at most `max_output_tokens` tokens
    pub async fn summarize(&self, texts: &[String], max_output_tokens: usize) -> Result<String> {
        let context = self.build_context(texts);
        let summary = self
            .retry
            .run("summarization", || self.provider.summarize(&context, max_output_tokens))
            .await?;

        debug!("Summarized {} texts into {} chars", texts.len(), summary.len());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenEstimator as TokenEstimatorConfig;
    use crate::error::{ProviderError, TreeError};
    use crate::retry::Deployment;
    use crate::summarization::ExtractiveSummarizer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<String>>,
        failures_left: AtomicUsize,
        deployment: Deployment,
    }

    impl RecordingProvider {
        fn new(failures: usize, deployment: Deployment) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(failures),
                deployment,
            }
        }
    }

    #[async_trait]
    impl SummarizationProvider for RecordingProvider {
        async fn summarize(&self, context: &str, _max_tokens: usize) -> std::result::Result<String, ProviderError> {
            self.seen.lock().unwrap().push(context.to_string());
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ProviderError::RateLimited);
            }
            Ok("summary".to_string())
        }

        fn deployment(&self) -> Deployment {
            self.deployment
        }
    }

    fn words() -> TokenEstimator {
        TokenEstimator::new(TokenEstimatorConfig::WordBased { words_per_token: 1.0 })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_context_flattens_and_joins() {
        let provider = Arc::new(RecordingProvider::new(0, Deployment::Remote));
        let gateway = SummarizerGateway::new(provider.clone(), fast_retry(), 100, words());

        let texts = vec!["first line\nsecond line".to_string(), "other  text".to_string()];
        gateway.summarize(&texts, 10).await.unwrap();

        assert_eq!(
            provider.seen.lock().unwrap().as_slice(),
            ["first line second line\n\nother text"]
        );
    }

    #[test]
    fn test_context_truncated_to_input_budget() {
        let provider = Arc::new(RecordingProvider::new(0, Deployment::Remote));
        let gateway = SummarizerGateway::new(provider, fast_retry(), 3, words());

        let context = gateway.build_context(&["a b c d e".to_string()]);
        assert_eq!(context, "a b c");
    }

    #[tokio::test]
    async fn test_remote_provider_is_retried() {
        let provider = Arc::new(RecordingProvider::new(2, Deployment::Remote));
        let gateway = SummarizerGateway::new(provider.clone(), fast_retry(), 100, words());

        assert_eq!(gateway.summarize(&["x".to_string()], 5).await.unwrap(), "summary");
        assert_eq!(provider.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_in_process_provider_is_not_retried() {
        let provider = Arc::new(RecordingProvider::new(1, Deployment::InProcess));
        let gateway = SummarizerGateway::new(provider.clone(), fast_retry(), 100, words());

        let err = gateway.summarize(&["x".to_string()], 5).await.unwrap_err();
        assert!(matches!(
            err,
            TreeError::Provider(ProviderError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extractive_backend() {
        let gateway = SummarizerGateway::new(
            Arc::new(ExtractiveSummarizer::new(words())),
            fast_retry(),
            100,
            words(),
        );

        let summary = gateway
            .summarize(&["Alpha beta. Gamma.".to_string(), "Delta epsilon.".to_string()], 4)
            .await
            .unwrap();
        assert_eq!(summary, "Alpha beta. Delta epsilon.");
    }
}
