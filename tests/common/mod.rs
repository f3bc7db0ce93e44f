//! Shared test doubles: deterministic embedder and canned generators
#![allow(dead_code)]

use mnemo::embedding::{l2_normalize, EmbeddingError, EmbeddingProvider};
use mnemo::generation::{GenerationError, Generator};

pub const MOCK_DIMENSION: usize = 32;

/// Deterministic bag-of-words embedder: each token hashes into one of 32
/// buckets, counts are L2-normalized. Texts sharing vocabulary score high,
/// disjoint ones score near zero, and identical texts score exactly 1.0.
pub struct MockEmbedder;

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; MOCK_DIMENSION];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            let bucket = token
                .to_ascii_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % MOCK_DIMENSION] += 1.0;
        }
        l2_normalize(&mut v);
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-bow"
    }
}

/// Generator returning the same canned answer for every prompt
pub struct MockGenerator {
    pub answer: String,
}

impl MockGenerator {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

impl Generator for MockGenerator {
    fn generate(&self, _prompt: &str, _max_new_tokens: usize) -> Result<String, GenerationError> {
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Generator that always fails
pub struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &str, _max_new_tokens: usize) -> Result<String, GenerationError> {
        Err(GenerationError::Failed("model unavailable".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing-generator"
    }
}
