//! Embedding generation
//!
//! The engine consumes embeddings through the [`EmbeddingProvider`] trait and
//! relies on every returned vector being L2-normalized so that dot product
//! stands in for cosine similarity throughout the store, search and dedup
//! paths.

mod provider;

pub use provider::{l2_normalize, EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use serde::{Deserialize, Serialize};

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Embedding dimension (384 for MiniLM)
    pub dimension: usize,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
        }
    }
}
