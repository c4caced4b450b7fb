//! Sentence-aware splitting of raw text into token-bounded leaf segments

use super::token_estimator::TokenEstimator;
use crate::error::ChunkingError;
use tracing::debug;

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];
const PHRASE_DELIMITERS: &[char] = &[',', ';', ':'];

/// Splits text into leaf segments whose estimated size stays within a budget
#[derive(Debug, Clone)]
pub struct Chunker {
    estimator: TokenEstimator,
    overlap: usize,
}

impl Chunker {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self {
            estimator,
            overlap: 0,
        }
    }

    /// Carry the last `overlap` sentences of each chunk into the next one
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Split `text` into ordered, non-empty segments of at most `max_tokens`.
    ///
    /// Sentences are packed greedily. A sentence that alone exceeds the budget
    /// is split on phrase delimiters, then cut word by word.
    pub fn split(&self, text: &str, max_tokens: usize) -> Result<Vec<String>, ChunkingError> {
        if max_tokens == 0 {
            return Err(ChunkingError::ZeroBudget);
        }
        if text.trim().is_empty() {
            return Err(ChunkingError::EmptyInput);
        }

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for sentence in split_sentences(text) {
            if self.estimator.estimate(sentence) > max_tokens {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                    current.clear();
                }
                chunks.extend(self.split_oversized(sentence, max_tokens));
                continue;
            }

            current.push(sentence);
            if self.estimator.estimate(&current.join(" ")) <= max_tokens {
                continue;
            }

            current.pop();
            chunks.push(current.join(" "));

            let carry_from = current.len().saturating_sub(self.overlap);
            let mut next: Vec<&str> = current[carry_from..].to_vec();
            next.push(sentence);
            while next.len() > 1 && self.estimator.estimate(&next.join(" ")) > max_tokens {
                next.remove(0);
            }
            current = next;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        debug!("Split {} chars into {} chunks", text.len(), chunks.len());
        Ok(chunks)
    }

    fn split_oversized(&self, sentence: &str, max_tokens: usize) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();

        for phrase in split_after(sentence, PHRASE_DELIMITERS) {
            if self.estimator.estimate(phrase) > max_tokens {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                pieces.extend(self.hard_cut(phrase, max_tokens));
                continue;
            }

            let candidate = if current.is_empty() {
                phrase.to_string()
            } else {
                format!("{} {}", current, phrase)
            };

            if self.estimator.estimate(&candidate) > max_tokens {
                pieces.push(std::mem::replace(&mut current, phrase.to_string()));
            } else {
                current = candidate;
            }
        }

        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    fn hard_cut(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut rest = text.trim();

        while !rest.is_empty() {
            let mut head = self.estimator.truncate(rest, max_tokens);
            if head.is_empty() {
                // Budget smaller than one character's estimate; still make progress
                let first = rest.chars().next().map_or(rest.len(), char::len_utf8);
                head = &rest[..first];
            }
            pieces.push(head.to_string());
            rest = rest[head.len()..].trim_start();
        }
        pieces
    }
}

/// Sentences in order, trimmed, never empty. Line breaks always end a sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    text.lines()
        .flat_map(|line| split_after(line, SENTENCE_TERMINATORS))
        .collect()
}

/// Split after each delimiter that is followed by whitespace or the end of input
fn split_after<'a>(text: &'a str, delimiters: &[char]) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if !delimiters.contains(&ch) {
            continue;
        }
        let end = idx + ch.len_utf8();
        if text[end..].chars().next().map_or(true, char::is_whitespace) {
            parts.push(text[start..end].trim());
            start = end;
        }
    }
    parts.push(text[start..].trim());

    parts.into_iter().filter(|part| !part.is_empty()).collect()
}
