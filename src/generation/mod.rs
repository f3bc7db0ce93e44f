//! Answer generation collaborator seam
//!
//! The generative model is a black box to the engine: it receives a prompt
//! string and a token budget and returns text.

use thiserror::Error;

/// Hard ceiling on the per-answer token budget
pub const MAX_NEW_TOKENS_CAP: usize = 256;

/// Default token budget when the caller does not specify one
pub const DEFAULT_MAX_NEW_TOKENS: usize = 64;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation is not configured for this deployment")]
    Disabled,

    #[error("Model generation failed: {0}")]
    Failed(String),
}

/// Trait for text-completion backends
pub trait Generator: Send + Sync {
    /// Complete `prompt` within `max_new_tokens`
    fn generate(&self, prompt: &str, max_new_tokens: usize)
        -> Result<String, GenerationError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Assemble the grounded question-answering prompt from retrieved context
pub fn build_prompt(context: &str, query: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {query}\nAnswer using ONLY the context above.")
}
