//! Token counting under a single fixed tokenization scheme.
//!
//! Everything that compares sizes goes through a [`TokenEstimator`]. The
//! scheme is fixed for the lifetime of a deployment; changing it invalidates
//! stored `token_count` values and is treated as a breaking schema change,
//! not a runtime concern.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::types::RagError;

/// Deterministic token length estimation plus token-boundary splitting.
pub trait TokenEstimator: Send + Sync {
    /// Number of tokens in `text`. Never fails; empty text is zero.
    fn count(&self, text: &str) -> usize;

    /// Splits `text` into pieces of at most `max_tokens` tokens each.
    ///
    /// Used as the fallback for single sentences that exceed the chunk
    /// ceiling. The default implementation packs whitespace-separated words
    /// greedily; BPE-backed estimators override it with real token-boundary
    /// slicing.
    fn split_to_fit(&self, text: &str, max_tokens: usize) -> Vec<String> {
        pack_words(&|piece| self.count(piece), text, max_tokens)
    }
}

impl<T: TokenEstimator + ?Sized> TokenEstimator for Arc<T> {
    fn count(&self, text: &str) -> usize {
        (**self).count(text)
    }

    fn split_to_fit(&self, text: &str, max_tokens: usize) -> Vec<String> {
        (**self).split_to_fit(text, max_tokens)
    }
}

fn pack_words(count: &dyn Fn(&str) -> usize, text: &str, max_tokens: usize) -> Vec<String> {
    if max_tokens == 0 {
        return vec![text.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if count(&candidate) > max_tokens && !current.is_empty() {
            pieces.push(current);
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// `cl100k_base` BPE estimator, the deployment's fixed scheme.
#[derive(Clone)]
pub struct Cl100kEstimator {
    bpe: Arc<CoreBPE>,
}

impl Cl100kEstimator {
    pub fn new() -> Result<Self, RagError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| RagError::Config(format!("failed to load cl100k_base: {err}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for Cl100kEstimator {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn split_to_fit(&self, text: &str, max_tokens: usize) -> Vec<String> {
        if max_tokens == 0 {
            return vec![text.to_string()];
        }
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return vec![text.to_string()];
        }
        let mut pieces = Vec::with_capacity(tokens.len().div_ceil(max_tokens));
        for window in tokens.chunks(max_tokens) {
            match self.bpe.decode(window.to_vec()) {
                Ok(piece) => pieces.push(piece),
                // A window edge can land inside a multi-byte sequence;
                // fall back to whitespace packing for the whole sentence.
                Err(_) => return pack_words(&|piece| self.count(piece), text, max_tokens),
            }
        }
        pieces
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::TokenEstimator;

    /// One whitespace-separated word counts as one token. Gives tests exact
    /// arithmetic over chunk sizes.
    pub(crate) struct WordEstimator;

    impl TokenEstimator for WordEstimator {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }
}
