//! Per-scope chat history
//!
//! Each scope keeps an ordered `chat_history.json` of question/answer
//! exchanges. Loads are tolerant (a missing or corrupt file reads as empty);
//! writes go through the same temp+fsync+rename discipline as the store.

use crate::error::{MnemoError, Result};
use crate::search::SearchHit;
use crate::store::{write_atomic, Scope};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "chat_history.json";

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SearchHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f32>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
            ts: chrono::Utc::now().timestamp(),
            sources: None,
            avg_score: None,
        }
    }

    pub fn assistant(
        text: impl Into<String>,
        sources: Vec<SearchHit>,
        avg_score: f32,
    ) -> Self {
        Self {
            role: "assistant".to_string(),
            text: text.into(),
            ts: chrono::Utc::now().timestamp(),
            sources: Some(sources),
            avg_score: Some(avg_score),
        }
    }
}

/// Handle to one scope's history file
pub struct ChatHistory {
    path: PathBuf,
}

impl ChatHistory {
    pub fn for_scope(root: &Path, scope: &Scope) -> Self {
        Self {
            path: scope.dir(root).join(HISTORY_FILE),
        }
    }

    /// Load the full history; missing or corrupt files read as empty
    pub fn load(&self) -> Vec<Message> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Vec::new(),
        };

        match serde_json::from_slice(&bytes) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(
                    "History file {} is unparseable ({}); starting fresh",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Append messages and return the full updated history
    pub fn append(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut history = self.load();
        history.extend(messages);
        self.persist(&history)?;
        Ok(history)
    }

    /// Replace the whole history
    pub fn replace(&self, messages: Vec<Message>) -> Result<()> {
        self.persist(&messages)
    }

    fn persist(&self, messages: &[Message]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| MnemoError::Io {
                source: e,
                context: format!("Failed to create history directory: {}", parent.display()),
            })?;
        }

        let json = serde_json::to_vec_pretty(messages).map_err(|e| MnemoError::Json {
            source: e,
            context: format!("Failed to encode history: {}", self.path.display()),
        })?;
        write_atomic(&self.path, &json)
    }
}
