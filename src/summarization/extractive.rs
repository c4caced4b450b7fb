//! In-process extractive summarizer
//!
//! Takes the leading sentence of every paragraph, then keeps filling with the
//! following sentences until the output budget is spent.

use super::SummarizationProvider;
use crate::chunking::TokenEstimator;
use crate::error::ProviderError;
use crate::retry::Deployment;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    estimator: TokenEstimator,
}

impl ExtractiveSummarizer {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    fn sentences(paragraph: &str) -> Vec<&str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for (idx, ch) in paragraph.char_indices() {
            if matches!(ch, '.' | '!' | '?') {
                let end = idx + ch.len_utf8();
                if paragraph[end..].chars().next().map_or(true, char::is_whitespace) {
                    sentences.push(paragraph[start..end].trim());
                    start = end;
                }
            }
        }
        sentences.push(paragraph[start..].trim());
        sentences.retain(|s| !s.is_empty());
        sentences
    }

    /// Summarize synchronously
    pub fn summarize_text(&self, context: &str, max_tokens: usize) -> String {
        let paragraphs: Vec<Vec<&str>> = context
            .split("\n\n")
            .map(Self::sentences)
            .filter(|sentences| !sentences.is_empty())
            .collect();

        // Round-robin: first sentences of all paragraphs, then second ones, ...
        let depth = paragraphs.iter().map(Vec::len).max().unwrap_or(0);
        let ordered = (0..depth).flat_map(|round| {
            paragraphs
                .iter()
                .filter_map(move |sentences| sentences.get(round).copied())
        });

        let mut summary = String::new();
        for sentence in ordered {
            let candidate = if summary.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", summary, sentence)
            };
            if self.estimator.estimate(&candidate) > max_tokens {
                break;
            }
            summary = candidate;
        }

        if summary.is_empty() {
            summary = self.estimator.truncate(context.trim(), max_tokens).to_string();
        }
        summary
    }
}

#[async_trait]
impl SummarizationProvider for ExtractiveSummarizer {
    async fn summarize(&self, context: &str, max_tokens: usize) -> Result<String, ProviderError> {
        Ok(self.summarize_text(context, max_tokens))
    }

    fn deployment(&self) -> Deployment {
        Deployment::InProcess
    }
}
