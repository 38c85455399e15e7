//! Token estimation for sizing chunks against a model's context window.

use std::sync::Arc;

const CHARS_PER_TOKEN: usize = 4;
const WORD_MULTIPLIER: f64 = 1.3;
const SYMBOL_DIVISOR: usize = 10;

/// Type of tokenizer used to size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// Character-based heuristic (~4 chars per token)
    #[default]
    Simple,
    /// Mix of word, character and symbol counts
    Enhanced,
}

impl TokenizerKind {
    /// Creates an estimator of this kind.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        }
    }
}

/// Estimates how many model tokens a piece of text costs.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in `text`.
    ///
    /// Must return 0 for the empty string and be monotonic in practice:
    /// a prefix never costs more than the whole.
    fn estimate(&self, text: &str) -> usize;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Averages a word-based and a character-based estimate, then adds a
/// penalty for punctuation, which tokenizers tend to split finely in code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let mut chars = 0usize;
        let mut symbols = 0usize;
        for c in text.chars() {
            chars += 1;
            if !c.is_alphanumeric() && !c.is_whitespace() {
                symbols += 1;
            }
        }
        let words = text.split_whitespace().count();

        let word_estimate = (words as f64 * WORD_MULTIPLIER) as usize;
        let char_estimate = chars / CHARS_PER_TOKEN;

        (word_estimate.saturating_add(char_estimate) / 2)
            .saturating_add(symbols / SYMBOL_DIVISOR)
            .max(1)
    }
}
