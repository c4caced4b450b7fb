//! Wire models for OpenAI-compatible embedding endpoints

use serde::{Deserialize, Serialize};

/// Request to generate embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Input text(s) to embed
    pub input: EmbeddingInput,

    /// Model name (optional, the endpoint may serve a single model)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Input variants for embedding requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

/// Response from embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Generated embeddings
    pub data: Vec<EmbeddingData>,

    /// Model used for generation
    #[serde(default)]
    pub model: Option<String>,

    /// Usage statistics
    #[serde(default)]
    pub usage: Option<UsageStats>,
}

/// Individual embedding data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Index in the batch
    pub index: usize,
}

/// Token usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

impl EmbeddingRequest {
    /// Create a request for a single text
    pub fn single(text: impl Into<String>, model: Option<String>) -> Self {
        Self {
            input: EmbeddingInput::Single(text.into()),
            model,
        }
    }

    /// Create a request for multiple texts
    pub fn batch(texts: Vec<String>, model: Option<String>) -> Self {
        Self {
            input: EmbeddingInput::Batch(texts),
            model,
        }
    }

    pub fn len(&self) -> usize {
        match &self.input {
            EmbeddingInput::Single(_) => 1,
            EmbeddingInput::Batch(texts) => texts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingResponse {
    /// Vectors in request order, checking that every index is present once
    pub fn into_ordered(mut self, expected: usize) -> Option<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return None;
        }
        self.data.sort_by_key(|d| d.index);
        if self.data.iter().enumerate().any(|(i, d)| d.index != i) {
            return None;
        }
        Some(self.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let single = serde_json::to_value(EmbeddingRequest::single("hi", None)).unwrap();
        assert_eq!(single, serde_json::json!({ "input": "hi" }));

        let batch = serde_json::to_value(EmbeddingRequest::batch(
            vec!["a".into(), "b".into()],
            Some("m".into()),
        ))
        .unwrap();
        assert_eq!(batch, serde_json::json!({ "input": ["a", "b"], "model": "m" }));
    }

    #[test]
    fn test_response_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                { "embedding": [2.0], "index": 1, "object": "embedding" },
                { "embedding": [1.0], "index": 0, "object": "embedding" }
            ],
            "model": "m"
        }))
        .unwrap();

        assert_eq!(response.into_ordered(2), Some(vec![vec![1.0], vec![2.0]]));
    }

    #[test]
    fn test_response_with_missing_index_is_rejected() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                { "embedding": [2.0], "index": 1 },
                { "embedding": [1.0], "index": 1 }
            ]
        }))
        .unwrap();

        assert_eq!(response.into_ordered(2), None);
    }
}
