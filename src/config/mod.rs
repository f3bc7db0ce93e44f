//! Configuration management
//!
//! TOML-backed configuration with defaults, environment-independent
//! validation and a conventional per-user config path.

use crate::chunking::ChunkingSpec;
use crate::embedding::EmbeddingConfig;
use crate::error::{MnemoError, Result, ValidationError};
use crate::generation::MAX_NEW_TOKENS_CAP;
use crate::retrain::RetrainConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingSpec,
    #[serde(default)]
    pub retrain: RetrainConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-scope collections, raw docs and history
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|dir| dir.join("mnemo"))
            .unwrap_or_else(|| PathBuf::from(".mnemo"));
        Self { data_dir }
    }
}

/// Query-path defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of chunks retrieved per query
    pub default_k: usize,
    /// Token budget per generated answer
    pub default_max_new_tokens: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            default_max_new_tokens: 64,
        }
    }
}

impl Config {
    /// Load configuration from a file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MnemoError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read config file: {}", path.display()),
        })?;
        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MnemoError::Io {
                source: e,
                context: format!("Failed to create config directory: {}", parent.display()),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to write config file: {}", path.display()),
        })?;
        Ok(())
    }

    /// Conventional config file location (~/.config/mnemo/config.toml)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MnemoError::Config("Cannot determine config directory".to_string()))?;
        Ok(config_dir.join("mnemo").join("config.toml"))
    }

    /// Validate all sections, collecting every failure
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "must be greater than zero",
            ));
        } else if self.chunking.overlap >= self.chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "must be smaller than chunk_size ({} >= {})",
                    self.chunking.overlap, self.chunking.chunk_size
                ),
            ));
        }

        if self.embedding.model.is_empty() {
            errors.push(ValidationError::new("embedding.model", "must not be empty"));
        }
        if self.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "must be greater than zero",
            ));
        }
        if self.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "must be greater than zero",
            ));
        }

        for (path, value) in [
            (
                "retrain.auto_retrain_threshold",
                self.retrain.auto_retrain_threshold,
            ),
            (
                "retrain.memory_dedup_threshold",
                self.retrain.memory_dedup_threshold,
            ),
            (
                "retrain.rebuild_dedup_threshold",
                self.retrain.rebuild_dedup_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::new(path, "must be within [0.0, 1.0]"));
            }
        }

        // rebuild re-chunks synthetic memories with the default fixed overlap
        if self.retrain.synthetic_chunk_size <= ChunkingSpec::default().overlap {
            errors.push(ValidationError::new(
                "retrain.synthetic_chunk_size",
                format!(
                    "must be greater than the default overlap ({})",
                    ChunkingSpec::default().overlap
                ),
            ));
        }

        if self.query.default_k == 0 {
            errors.push(ValidationError::new(
                "query.default_k",
                "must be greater than zero",
            ));
        }
        if self.query.default_max_new_tokens == 0
            || self.query.default_max_new_tokens > MAX_NEW_TOKENS_CAP
        {
            errors.push(ValidationError::new(
                "query.default_max_new_tokens",
                format!("must be within [1, {MAX_NEW_TOKENS_CAP}]"),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MnemoError::ConfigValidation { errors })
        }
    }
}
