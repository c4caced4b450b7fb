//! Network-backed summarizer speaking the OpenAI chat completions protocol

use super::models::{ChatMessage, ChatRequest, ChatResponse};
use super::SummarizationProvider;
use crate::config::RemoteSummarizationConfig;
use crate::error::{ProviderError, Result, TreeError};
use crate::retry::Deployment;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, error, info};

const SYSTEM_PROMPT: &str = "You are a Summarizing Text Portal";

/// HTTP summarization client; one attempt per call
pub struct RemoteSummarizationClient {
    config: RemoteSummarizationConfig,
    http_client: Client,
}

impl RemoteSummarizationClient {
    pub fn new(config: RemoteSummarizationConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TreeError::Provider(ProviderError::Network(e)))?;

        info!("Initialized summarization client for model {}", config.model);

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request(&self, context: &str, max_tokens: usize) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Write a summary of the following, including as many key details as possible: {}:",
                    context
                )),
            ],
            max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl SummarizationProvider for RemoteSummarizationClient {
    async fn summarize(&self, context: &str, max_tokens: usize) -> std::result::Result<String, ProviderError> {
        let request = self.build_request(context, max_tokens);

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Summarization API error {}: {}", status, error_text);

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed,
                _ => ProviderError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let summary = body
            .first_content()
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Empty summary in response".to_string()))?
            .to_string();

        debug!("Received summary of {} chars", summary.len());
        Ok(summary)
    }

    fn deployment(&self) -> Deployment {
        Deployment::Remote
    }
}
