//! Token estimation utilities

use crate::config::TokenEstimator as TokenEstimatorConfig;

/// Token estimator for calculating token counts
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    config: TokenEstimatorConfig,
}

impl TokenEstimator {
    pub fn new(config: TokenEstimatorConfig) -> Self {
        Self { config }
    }

    /// Estimate token count for text
    pub fn estimate(&self, text: &str) -> usize {
        match &self.config {
            TokenEstimatorConfig::CharacterBased { chars_per_token } => {
                let char_count = text.chars().count();
                (char_count as f32 / chars_per_token).ceil() as usize
            }
            TokenEstimatorConfig::WordBased { words_per_token } => {
                let word_count = text.split_whitespace().count();
                (word_count as f32 / words_per_token).ceil() as usize
            }
        }
    }

    /// Estimate token counts for multiple texts
    pub fn estimate_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.iter().map(|text| self.estimate(text)).collect()
    }

    /// Longest prefix of `text` (cut at a word boundary where possible)
    /// whose estimate fits in `max_tokens`
    pub fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        let window = self.window(text, max_tokens);
        if window.len() == text.len() && self.estimate(text) <= max_tokens {
            return text;
        }

        let mut end = 0;
        for (idx, _) in window.match_indices(char::is_whitespace) {
            if self.estimate(&window[..idx]) > max_tokens {
                break;
            }
            end = idx;
        }

        if end == 0 {
            // A single oversized word: cut by characters
            for (idx, ch) in window.char_indices() {
                let next = idx + ch.len_utf8();
                if self.estimate(&window[..next]) > max_tokens {
                    break;
                }
                end = next;
            }
        }

        text[..end].trim_end()
    }

    /// Prefix of `text` holding every prefix that can fit in `max_tokens`,
    /// so truncation never scans past it. It is all of `text` or strictly
    /// over budget.
    fn window<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        match self.config {
            TokenEstimatorConfig::CharacterBased { chars_per_token } => {
                let limit = (max_tokens as f32 * chars_per_token).floor() as usize + 2;
                match text.char_indices().nth(limit) {
                    Some((idx, _)) => &text[..idx],
                    None => text,
                }
            }
            TokenEstimatorConfig::WordBased { words_per_token } => {
                let limit = (max_tokens as f32 * words_per_token).floor() as usize + 2;
                let mut words = 0;
                let mut in_word = false;
                for (idx, ch) in text.char_indices() {
                    if ch.is_whitespace() {
                        in_word = false;
                    } else if !in_word {
                        if words == limit {
                            return &text[..idx];
                        }
                        words += 1;
                        in_word = true;
                    }
                }
                text
            }
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(TokenEstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_based_estimation() {
        let config = TokenEstimatorConfig::CharacterBased { chars_per_token: 4.0 };
        let estimator = TokenEstimator::new(config);

        let text = "Hello world";
        let tokens = estimator.estimate(text);

        assert_eq!(tokens, 3); // 11 chars / 4 = 2.75 -> 3
    }

    #[test]
    fn test_word_based_estimation() {
        let config = TokenEstimatorConfig::WordBased { words_per_token: 1.0 };
        let estimator = TokenEstimator::new(config);

        assert_eq!(estimator.estimate("Hello world test"), 3);
        assert_eq!(estimator.estimate_batch(&["a b".to_string(), "".to_string()]), vec![2, 0]);
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let estimator = TokenEstimator::new(TokenEstimatorConfig::WordBased { words_per_token: 1.0 });

        assert_eq!(estimator.truncate("one two three four", 2), "one two");
        assert_eq!(estimator.truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_single_long_word() {
        let estimator = TokenEstimator::new(TokenEstimatorConfig::CharacterBased { chars_per_token: 1.0 });

        assert_eq!(estimator.truncate("abcdefgh", 3), "abc");
    }

    #[test]
    fn test_truncate_only_scans_a_prefix() {
        let words = TokenEstimator::new(TokenEstimatorConfig::WordBased { words_per_token: 1.0 });
        let chars = TokenEstimator::new(TokenEstimatorConfig::CharacterBased { chars_per_token: 4.0 });
        let text = "lorem ipsum ".repeat(100_000);

        assert_eq!(words.window(&text, 3), "lorem ipsum lorem ipsum lorem ");
        assert!(chars.window(&text, 3).len() <= 14);

        assert_eq!(words.truncate(&text, 3), "lorem ipsum lorem");
        assert_eq!(chars.truncate(&text, 3), "lorem ipsum");
    }
}
