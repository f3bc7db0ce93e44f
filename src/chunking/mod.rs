//! Text chunking strategies
//!
//! Splits extracted document text into retrievable units before embedding.
//! All strategies operate on `char` positions so multi-byte input can never
//! be split inside a code point, and all of them yield an empty sequence for
//! empty or whitespace-only input.

use crate::embedding::EmbeddingProvider;
use crate::error::{MnemoError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Similarity floor for merging adjacent sentences in `semantic` chunking
pub const SEMANTIC_MERGE_THRESHOLD: f32 = 0.6;

/// Chunking strategy selector.
///
/// Unknown or empty strategy names fall back to `Fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[serde(alias = "sentences")]
    Sentence,
    #[serde(alias = "paragraphs")]
    Paragraph,
    Semantic,
    Smart,
    #[serde(other)]
    Fixed,
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::Fixed
    }
}

impl FromStr for ChunkStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "sentence" | "sentences" => ChunkStrategy::Sentence,
            "paragraph" | "paragraphs" => ChunkStrategy::Paragraph,
            "semantic" => ChunkStrategy::Semantic,
            "smart" => ChunkStrategy::Smart,
            _ => ChunkStrategy::Fixed,
        })
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkStrategy::Fixed => "fixed",
            ChunkStrategy::Sentence => "sentence",
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::Semantic => "semantic",
            ChunkStrategy::Smart => "smart",
        };
        f.write_str(name)
    }
}

/// Chunking parameters consumed read-only by the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSpec {
    pub strategy: ChunkStrategy,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSpec {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Fixed,
            chunk_size: 800,
            overlap: 200,
        }
    }
}

impl ChunkingSpec {
    pub fn new(strategy: ChunkStrategy, chunk_size: usize, overlap: usize) -> Self {
        Self {
            strategy,
            chunk_size,
            overlap,
        }
    }

    /// Reject parameter combinations that could stall the sliding window
    pub fn validate(&self) -> Result<()> {
        validate_window(self.chunk_size, self.overlap)
    }
}

fn validate_window(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(MnemoError::InvalidChunking(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(MnemoError::InvalidChunking(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Dispatch to the strategy named in `spec`.
///
/// `semantic` is the only strategy that consults the embedder; the rest are
/// pure functions of the text and parameters.
pub fn chunk_with_strategy(
    text: &str,
    spec: &ChunkingSpec,
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<String>> {
    match spec.strategy {
        ChunkStrategy::Fixed => chunk_fixed(text, spec.chunk_size, spec.overlap),
        ChunkStrategy::Sentence => chunk_sentences(text, spec.chunk_size, spec.overlap),
        ChunkStrategy::Paragraph => Ok(chunk_paragraphs(text)),
        ChunkStrategy::Semantic => chunk_semantic(text, embedder, SEMANTIC_MERGE_THRESHOLD),
        ChunkStrategy::Smart => chunk_smart(text, spec.chunk_size, spec.overlap),
    }
}

/// Fixed-size sliding window over character positions.
///
/// When a window boundary falls inside a word and a whitespace exists in the
/// back half of the window, the window is trimmed back to that whitespace.
/// The next window starts `overlap` characters before the actual (possibly
/// trimmed) end, clamped so the window always moves forward.
pub fn chunk_fixed(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_window(chunk_size, overlap)?;

    let normalized = text.replace("\r\n", "\n");
    let chars: Vec<char> = normalized.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let mut end = (start + chunk_size).min(n);

        if end < n {
            // avoid splitting a word: back off to the last whitespace in the
            // window, but only if it sits past the window midpoint
            if let Some(rel) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if rel > chunk_size / 2 {
                    end = start + rel;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let cleaned = piece.trim();
        if !cleaned.is_empty() {
            chunks.push(cleaned.to_string());
        }

        if end >= n {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    Ok(chunks)
}

/// Sentence-aware aggregation.
///
/// Sentences accumulate into a running buffer while the joined length stays
/// within `chunk_size`; on overflow the buffer is flushed. A single sentence
/// longer than `chunk_size` is routed through the fixed window and its output
/// spliced in, with the buffer reset.
pub fn chunk_sentences(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_window(chunk_size, overlap)?;

    let normalized = text.replace("\r\n", "\n");
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(&normalized) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let sentence_len = sentence.chars().count();
        if current.chars().count() + sentence_len + 1 <= chunk_size {
            if current.is_empty() {
                current.push_str(sentence);
            } else {
                current.push(' ');
                current.push_str(sentence);
            }
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if sentence_len > chunk_size {
                chunks.extend(chunk_fixed(sentence, chunk_size, overlap)?);
            } else {
                current = sentence.to_string();
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

/// One chunk per blank-line-separated paragraph; no merging, no size limit
pub fn chunk_paragraphs(text: &str) -> Vec<String> {
    static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();
    let re = PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid regex"));

    let normalized = text.replace("\r\n", "\n");
    re.split(&normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Embedding-guided chunking: adjacent sentences merge into one chunk while
/// the cosine similarity between consecutive sentence embeddings stays above
/// `threshold`; a similarity drop closes the chunk.
pub fn chunk_semantic(
    text: &str,
    embedder: &dyn EmbeddingProvider,
    threshold: f32,
) -> Result<Vec<String>> {
    let normalized = text.replace("\r\n", "\n");
    let sentences: Vec<String> = split_sentences(&normalized)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return Ok(Vec::new());
    }
    if sentences.len() == 1 {
        return Ok(sentences);
    }

    let embeddings = embedder.embed_batch(&sentences)?;

    let mut chunks = Vec::new();
    let mut current = sentences[0].clone();

    for i in 1..sentences.len() {
        let similarity = dot(&embeddings[i - 1], &embeddings[i]);
        if similarity > threshold {
            current.push(' ');
            current.push_str(&sentences[i]);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = sentences[i].clone();
        }
    }
    chunks.push(current);

    Ok(chunks)
}

/// Sentence chunking followed by a greedy merge pass: consecutive chunks are
/// joined with a newline while the merged length stays within `chunk_size`.
pub fn chunk_smart(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let base = chunk_sentences(text, chunk_size, overlap)?;

    let mut merged = Vec::new();
    let mut buffer = String::new();

    for chunk in base {
        if buffer.is_empty() {
            buffer = chunk;
        } else if buffer.chars().count() + chunk.chars().count() + 1 <= chunk_size {
            buffer.push('\n');
            buffer.push_str(&chunk);
        } else {
            merged.push(std::mem::take(&mut buffer));
            buffer = chunk;
        }
    }

    if !buffer.is_empty() {
        merged.push(buffer);
    }

    Ok(merged)
}

/// Split text on sentence boundaries: `.`, `!` or `?` followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    static SENTENCE_BOUNDARY: OnceLock<Regex> = OnceLock::new();
    let re = SENTENCE_BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid regex"));

    let mut sentences = Vec::new();
    let mut start = 0;

    for m in re.find_iter(text) {
        // boundary sits just after the terminator, which is a 1-byte char
        let end = m.start() + 1;
        sentences.push(&text[start..end]);
        start = m.end();
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;

    /// Deterministic bag-of-words embedder: each token hashes into one of 16
    /// buckets, counts are L2-normalized. Shared-vocabulary sentences score
    /// high, disjoint ones score near zero.
    struct HashEmbedder;

    impl EmbeddingProvider for HashEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0f32; 16];
            for token in text.split_whitespace() {
                let token = token.trim_matches(|c: char| !c.is_alphanumeric());
                let bucket = token
                    .to_ascii_lowercase()
                    .bytes()
                    .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                v[bucket % 16] += 1.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            Ok(v)
        }

        fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            16
        }

        fn model_name(&self) -> &str {
            "hash-bow"
        }
    }

    #[test]
    fn test_fixed_empty_input() {
        assert!(chunk_fixed("", 100, 10).unwrap().is_empty());
        assert!(chunk_fixed("   \n\t  ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_fixed_respects_chunk_size() {
        let text = "word ".repeat(500);
        let chunks = chunk_fixed(&text, 100, 20).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn test_fixed_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let a = chunk_fixed(&text, 120, 30).unwrap();
        let b = chunk_fixed(&text, 120, 30).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fixed_word_boundary_scenario() {
        // window trims near word boundaries, consecutive chunks overlap by up
        // to 2 trailing characters of the prior chunk's trimmed tail
        let chunks = chunk_fixed("A cat sat. A dog ran.", 10, 2).unwrap();
        assert_eq!(chunks, vec!["A cat sat.", "t. A dog", "og ran."]);
    }

    #[test]
    fn test_fixed_rejects_degenerate_overlap() {
        assert!(chunk_fixed("some text", 10, 10).is_err());
        assert!(chunk_fixed("some text", 10, 15).is_err());
        assert!(chunk_fixed("some text", 0, 0).is_err());
    }

    #[test]
    fn test_fixed_single_short_chunk() {
        let chunks = chunk_fixed("tiny", 100, 10).unwrap();
        assert_eq!(chunks, vec!["tiny"]);
    }

    #[test]
    fn test_sentence_accumulates_until_overflow() {
        let chunks = chunk_sentences("A cat sat. A dog ran.", 30, 2).unwrap();
        assert_eq!(chunks, vec!["A cat sat. A dog ran."]);

        let chunks = chunk_sentences("A cat sat. A dog ran.", 12, 2).unwrap();
        assert_eq!(chunks, vec!["A cat sat.", "A dog ran."]);
    }

    #[test]
    fn test_sentence_oversized_falls_back_to_fixed() {
        let long = "x".repeat(50);
        let text = format!("Short one. {long}. Tail one.");
        let chunks = chunk_sentences(&text, 20, 4).unwrap();
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
        assert_eq!(chunks.first().unwrap(), "Short one.");
        assert_eq!(chunks.last().unwrap(), "Tail one.");
    }

    #[test]
    fn test_paragraph_splits_on_blank_lines() {
        let text = "First paragraph\nstill first.\n\nSecond paragraph.\n\n   \n\nThird.";
        let chunks = chunk_paragraphs(text);
        assert_eq!(
            chunks,
            vec!["First paragraph\nstill first.", "Second paragraph.", "Third."]
        );
    }

    #[test]
    fn test_paragraph_no_size_enforcement() {
        let text = "a".repeat(5000);
        let chunks = chunk_paragraphs(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5000);
    }

    #[test]
    fn test_smart_merges_small_chunks() {
        let text = "One. Two. Three. Four.";
        let sentence_chunks = chunk_sentences(text, 10, 2).unwrap();
        let smart_chunks = chunk_smart(text, 10, 2).unwrap();
        assert!(smart_chunks.len() <= sentence_chunks.len());
        for chunk in &smart_chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn test_semantic_breaks_on_topic_shift() {
        let text = "The cat sat on the mat. The cat lay on the mat. Quantum flux calibration drifted.";
        let chunks = chunk_semantic(text, &HashEmbedder, 0.6).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("cat sat"));
        assert!(chunks[0].contains("cat lay"));
        assert!(chunks[1].contains("Quantum"));
    }

    #[test]
    fn test_semantic_single_sentence() {
        let chunks = chunk_semantic("Just one sentence here.", &HashEmbedder, 0.6).unwrap();
        assert_eq!(chunks, vec!["Just one sentence here."]);
    }

    #[test]
    fn test_strategy_parse_fallback() {
        assert_eq!("fixed".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Fixed);
        assert_eq!(
            "sentences".parse::<ChunkStrategy>().unwrap(),
            ChunkStrategy::Sentence
        );
        assert_eq!("smart".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Smart);
        // unknown and empty names fall back to fixed
        assert_eq!("".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Fixed);
        assert_eq!(
            "recursive".parse::<ChunkStrategy>().unwrap(),
            ChunkStrategy::Fixed
        );
    }

    #[test]
    fn test_dispatch_uses_spec_strategy() {
        let spec = ChunkingSpec::new(ChunkStrategy::Paragraph, 800, 200);
        let chunks = chunk_with_strategy("One.\n\nTwo.", &spec, &HashEmbedder).unwrap();
        assert_eq!(chunks, vec!["One.", "Two."]);
    }

    #[test]
    fn test_crlf_normalized() {
        let chunks = chunk_paragraphs("alpha\r\n\r\nbeta");
        assert_eq!(chunks, vec!["alpha", "beta"]);
    }
}
