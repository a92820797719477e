//! Boundary-preserving token chunking.
//!
//! Splits a document into an ordered sequence of overlapping passages that
//! respect sentence boundaries and the configured token bounds. Chunking is a
//! pure function of the input text, the [`ChunkingConfig`], and the token
//! estimator: no side effects, no hidden state, same output every run.
//!
//! Chunking never fails. Oversized sentences are hard-split at token
//! boundaries, empty input yields an empty sequence.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ChunkingConfig;
use crate::tokenizer::TokenEstimator;

/// A chunk produced by the engine, before it is assigned an id and embedded.
#[derive(Clone, Debug, PartialEq)]
pub struct PassageDraft {
    pub text: String,
    pub token_count: usize,
}

/// Sentence terminators, optionally followed by a closing quote or bracket,
/// then whitespace. ASCII-only by deliberate choice; blank lines always break.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).expect("sentence boundary regex"));

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break regex"));

#[derive(Clone, Debug)]
struct Unit {
    text: String,
    tokens: usize,
}

/// In-progress chunk: the first `seeded` units repeat the tail of the
/// previous chunk for overlap; the rest are novel.
struct Assembly {
    units: Vec<Unit>,
    tokens: usize,
    seeded: usize,
}

impl Assembly {
    fn fresh() -> Self {
        Self {
            units: Vec::new(),
            tokens: 0,
            seeded: 0,
        }
    }

    fn seeded_with(units: Vec<Unit>) -> Self {
        let tokens = units.iter().map(|u| u.tokens).sum();
        let seeded = units.len();
        Self {
            units,
            tokens,
            seeded,
        }
    }

    fn push(&mut self, unit: Unit) {
        self.tokens += unit.tokens;
        self.units.push(unit);
    }
}

/// Splits `text` into sentence units, hard-splitting any sentence above
/// `max_tokens` into roughly target-sized pieces.
fn segment(text: &str, config: &ChunkingConfig, estimator: &dyn TokenEstimator) -> Vec<Unit> {
    let mut units = Vec::new();
    for paragraph in PARAGRAPH_BREAK.split(text) {
        for sentence in split_sentences(paragraph) {
            let tokens = estimator.count(&sentence);
            if tokens == 0 {
                continue;
            }
            if tokens > config.max_tokens {
                let piece_budget = config
                    .target_tokens
                    .min(config.max_tokens - config.min_tokens)
                    .max(1);
                for piece in estimator.split_to_fit(&sentence, piece_budget) {
                    let piece_tokens = estimator.count(&piece);
                    if piece_tokens > 0 {
                        units.push(Unit {
                            text: piece,
                            tokens: piece_tokens,
                        });
                    }
                }
            } else {
                units.push(Unit {
                    text: sentence,
                    tokens,
                });
            }
        }
    }
    units
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(paragraph) {
        let sentence = paragraph[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = boundary.end();
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Trailing units of a closed chunk totalling at most `overlap_tokens`,
/// used to seed the next chunk. When even the final sentence alone exceeds
/// the budget, its trailing words are trimmed to a fragment instead, so the
/// overlap never collapses to nothing.
fn overlap_tail(
    units: &[Unit],
    overlap_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<Unit> {
    let mut tail = Vec::new();
    let mut total = 0;
    for unit in units.iter().rev() {
        if total + unit.tokens > overlap_tokens {
            break;
        }
        total += unit.tokens;
        tail.push(unit.clone());
    }
    tail.reverse();
    if tail.is_empty() && overlap_tokens > 0 {
        if let Some(fragment) = fragment_tail(units, overlap_tokens, estimator) {
            tail.push(fragment);
        }
    }
    tail
}

/// Largest trailing word span of the final sentence that stays within
/// `overlap_tokens`.
fn fragment_tail(
    units: &[Unit],
    overlap_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Option<Unit> {
    let last = units.last()?;
    let words: Vec<&str> = last.text.split_whitespace().collect();
    let mut start = words.len();
    while start > 0 {
        let candidate = words[start - 1..].join(" ");
        if estimator.count(&candidate) > overlap_tokens {
            break;
        }
        start -= 1;
    }
    if start == words.len() {
        return None;
    }
    let text = words[start..].join(" ");
    let tokens = estimator.count(&text);
    Some(Unit { text, tokens })
}

/// Chunks `text` into ordered, overlapping passages.
///
/// Non-terminal chunks satisfy `min_tokens <= token_count <= max_tokens`,
/// with two deliberate tolerances: the final chunk of a document shorter
/// than `min_tokens` stays undersized, and a chunk whose overlap seed is
/// still below `min_tokens` absorbs the next sentence even when that runs
/// past `max_tokens` rather than closing undersized.
pub fn chunk_text(
    text: &str,
    config: &ChunkingConfig,
    estimator: &dyn TokenEstimator,
) -> Vec<PassageDraft> {
    let units = segment(text, config, estimator);
    if units.is_empty() {
        return Vec::new();
    }

    let mut closed: Vec<Assembly> = Vec::new();
    let mut current = Assembly::fresh();

    for unit in units {
        let would_overflow = current.tokens + unit.tokens > config.max_tokens;
        // A chunk still below min_tokens (an overlap seed, or a degenerate
        // config) absorbs the next sentence even past max_tokens: oversized
        // beats closing undersized.
        if would_overflow && !current.units.is_empty() && current.tokens >= config.min_tokens {
            let seed = overlap_tail(&current.units, config.overlap_tokens, estimator);
            closed.push(current);
            current = Assembly::seeded_with(seed);
        }
        current.push(unit);
        if current.tokens >= config.target_tokens {
            let seed = overlap_tail(&current.units, config.overlap_tokens, estimator);
            closed.push(current);
            current = Assembly::seeded_with(seed);
        }
    }

    // A leftover below min_tokens folds its novel sentences into the previous
    // chunk; the seeded prefix is already there. A leftover holding only seed
    // units is discarded outright.
    if current.units.len() > current.seeded {
        let undersized = current.tokens < config.min_tokens;
        match closed.last_mut() {
            Some(previous) if undersized => {
                for unit in current.units.drain(current.seeded..) {
                    previous.push(unit);
                }
            }
            _ => closed.push(current),
        }
    }

    closed
        .into_iter()
        .map(|assembly| {
            let text = assembly
                .units
                .iter()
                .map(|u| u.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let token_count = estimator.count(&text);
            PassageDraft { text, token_count }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::testutil::WordEstimator;
    use proptest::prelude::*;

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            target_tokens: 512,
            min_tokens: 100,
            max_tokens: 800,
            overlap_tokens: 50,
        }
    }

    /// `count` sentences of `words` words each, one token per word.
    fn prose(count: usize, words: usize) -> String {
        (0..count)
            .map(|i| {
                let body = (0..words - 1)
                    .map(|w| format!("s{i}w{w}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{body} end.")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_and_whitespace_yield_no_chunks() {
        assert!(chunk_text("", &config(), &WordEstimator).is_empty());
        assert!(chunk_text("   \n\n  \t", &config(), &WordEstimator).is_empty());
    }

    #[test]
    fn short_document_yields_single_undersized_chunk() {
        let chunks = chunk_text("Just one small sentence.", &config(), &WordEstimator);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].token_count < config().min_tokens);
    }

    #[test]
    fn fifteen_hundred_token_document_yields_three_bounded_chunks() {
        let text = prose(100, 15);
        let cfg = config();
        let chunks = chunk_text(&text, &cfg, &WordEstimator);
        assert_eq!(chunks.len(), 3, "expected 3 chunks, got {:?}", chunks.len());
        for chunk in &chunks {
            assert!(chunk.token_count >= cfg.min_tokens);
            assert!(chunk.token_count <= cfg.max_tokens);
        }
    }

    #[test]
    fn consecutive_chunks_overlap_near_configured_tokens() {
        let cfg = config();
        let chunks = chunk_text(&prose(100, 15), &cfg, &WordEstimator);
        for pair in chunks.windows(2) {
            let previous: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            // Longest prefix of `next` that equals a suffix of `previous`.
            let bound = cfg.overlap_tokens.min(previous.len()).min(next.len());
            let overlap = (1..=bound)
                .rev()
                .find(|&k| previous[previous.len() - k..] == next[..k])
                .unwrap_or(0);
            assert!(
                overlap >= cfg.overlap_tokens.saturating_sub(20) && overlap <= cfg.overlap_tokens,
                "overlap of {overlap} tokens is not near {}",
                cfg.overlap_tokens
            );
        }
    }

    #[test]
    fn long_sentences_still_overlap_at_boundaries() {
        // Every sentence is 60 tokens, larger than the 50-token overlap
        // budget, so no whole sentence fits the seed; the tail of the final
        // sentence must carry the overlap instead.
        let cfg = config();
        let chunks = chunk_text(&prose(40, 60), &cfg, &WordEstimator);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let previous: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            let bound = cfg.overlap_tokens.min(previous.len()).min(next.len());
            let overlap = (1..=bound)
                .rev()
                .find(|&k| previous[previous.len() - k..] == next[..k])
                .unwrap_or(0);
            assert_eq!(
                overlap, cfg.overlap_tokens,
                "boundary overlap of {overlap} tokens is not the configured {}",
                cfg.overlap_tokens
            );
        }
    }

    #[test]
    fn undersized_seed_prefers_oversized_chunk_over_early_close() {
        let cfg = config();
        // A 480 + 40 pair closes the first chunk at 520 and seeds exactly the
        // trailing 40-token sentence; the 770-token sentence that follows
        // cannot close a 40-token chunk below min_tokens, so the second
        // chunk runs to 810, past max_tokens.
        let sentence = |tag: &str, words: usize| {
            let body = (0..words - 1)
                .map(|w| format!("{tag}w{w}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{body} end.")
        };
        let text = format!(
            "{} {} {} {}",
            sentence("a", 480),
            sentence("b", 40),
            sentence("c", 770),
            sentence("d", 150),
        );
        let chunks = chunk_text(&text, &cfg, &WordEstimator);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].token_count, 520);
        assert_eq!(
            chunks[1].token_count, 810,
            "seed plus the large sentence must stay one chunk"
        );
        assert!(chunks[1].text.contains("bw0"), "overlap seed must survive");
        assert!(chunks[2].token_count >= cfg.min_tokens);
    }

    #[test]
    fn every_sentence_survives_in_order() {
        let text = prose(100, 15);
        let cfg = config();
        let chunks = chunk_text(&text, &cfg, &WordEstimator);
        let concatenated: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let mut cursor = 0;
        for i in 0..100 {
            let marker = format!("s{i}w0");
            let found = concatenated[cursor..]
                .find(&marker)
                .unwrap_or_else(|| panic!("sentence {i} missing or out of order"));
            cursor += found;
        }
    }

    #[test]
    fn oversized_sentence_is_hard_split() {
        let cfg = config();
        // One unbroken 1000-word "sentence" with no terminator.
        let giant = (0..1000).map(|w| format!("w{w}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&giant, &cfg, &WordEstimator);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= cfg.max_tokens);
        }
        let total: usize = chunks.iter().map(|c| c.token_count).sum();
        assert!(total >= 1000, "hard split must not drop tokens");
    }

    #[test]
    fn trailing_fragment_merges_into_previous_chunk() {
        let cfg = ChunkingConfig {
            target_tokens: 50,
            min_tokens: 20,
            max_tokens: 80,
            overlap_tokens: 5,
        };
        // 11 sentences of 5 tokens: chunks close at 50; the last sentence
        // alone would be a 10-token fragment (5 seed + 5 novel), below min.
        let text = prose(11, 5);
        let chunks = chunk_text(&text, &cfg, &WordEstimator);
        assert!(!chunks.is_empty());
        let last = chunks.last().unwrap();
        assert!(
            last.token_count >= cfg.min_tokens,
            "trailing fragment should have been merged, got {} tokens",
            last.token_count
        );
        assert!(last.text.contains("s10w0"), "last sentence must survive");
    }

    #[test]
    fn paragraph_breaks_are_sentence_boundaries() {
        let text = "First line without terminator\n\nSecond paragraph here.";
        let chunks = chunk_text(text, &config(), &WordEstimator);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First line without terminator"));
        assert!(chunks[0].text.contains("Second paragraph here."));
    }

    proptest! {
        #[test]
        fn chunking_is_deterministic(sentences in 1usize..120, words in 3usize..20) {
            let text = prose(sentences, words);
            let cfg = config();
            let first = chunk_text(&text, &cfg, &WordEstimator);
            let second = chunk_text(&text, &cfg, &WordEstimator);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn non_terminal_chunks_stay_within_bounds(sentences in 1usize..200, words in 3usize..20) {
            let text = prose(sentences, words);
            let cfg = config();
            let chunks = chunk_text(&text, &cfg, &WordEstimator);
            prop_assert!(!chunks.is_empty());
            for chunk in &chunks[..chunks.len() - 1] {
                prop_assert!(chunk.token_count >= cfg.min_tokens);
                prop_assert!(chunk.token_count <= cfg.max_tokens);
            }
            prop_assert!(chunks.last().unwrap().token_count <= cfg.max_tokens + cfg.min_tokens);
        }
    }
}
