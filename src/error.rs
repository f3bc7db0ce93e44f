use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;

/// Main error type for the mnemo engine
#[derive(Error, Debug)]
pub enum MnemoError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Scope has no indexed collection yet.
    ///
    /// Callers serving a query against a brand-new scope must treat this as
    /// "no documents indexed", not as a system failure.
    #[error("No documents indexed for scope: {scope}")]
    CollectionNotFound { scope: String },

    /// Invalid chunking parameters (e.g. overlap >= chunk size)
    #[error("Invalid chunking parameters: {0}")]
    InvalidChunking(String),

    /// The vector/metadata parity invariant would be broken by a mutation
    #[error("Vector/metadata parity violated: {vectors} vectors vs {metadata} records")]
    ParityViolation { vectors: usize, metadata: usize },

    /// A rebuild found no raw documents and no synthetic memories
    #[error("No data found to rebuild index for scope: {scope}")]
    NothingToRebuild { scope: String },

    /// Embedding collaborator errors (propagated, never partially written)
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Generation collaborator errors (surfaced to the query caller)
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Vector file encode/decode errors
    #[error("Vector encoding error: {0}")]
    Encode(String),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MnemoError {
    /// Whether this error means "the scope simply has nothing indexed yet"
    pub fn is_not_found(&self) -> bool {
        matches!(self, MnemoError::CollectionNotFound { .. })
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for mnemo operations
pub type Result<T> = std::result::Result<T, MnemoError>;
