//! Raw document registry
//!
//! Enumerates the raw source documents owned by a scope so that reindex and
//! rebuild can re-derive a collection from first principles. The filesystem
//! implementation stores each document under the scope's `docs/` directory as
//! `<doc_id>-<filename>`.

use crate::error::{MnemoError, Result};
use crate::store::Scope;
use std::fs;
use std::path::{Path, PathBuf};

/// One raw document owned by a scope
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Stable document identifier
    pub id: String,
    /// Original filename
    pub filename: String,
    /// Byte location
    pub path: PathBuf,
}

/// Enumerates and reads raw documents for rebuild/reindex
pub trait DocumentRegistry: Send + Sync {
    /// All raw documents stored under the scope, in a stable order
    fn documents(&self, scope: &Scope) -> Result<Vec<RawDocument>>;

    /// Raw bytes of one document
    fn read(&self, doc: &RawDocument) -> Result<Vec<u8>>;

    /// Persist a new raw document under the scope, returning its record
    fn store(
        &self,
        scope: &Scope,
        doc_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<RawDocument>;
}

/// Filesystem-backed registry rooted at the engine's data directory
pub struct FsDocumentRegistry {
    root: PathBuf,
}

impl FsDocumentRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn docs_dir(&self, scope: &Scope) -> PathBuf {
        scope.dir(&self.root).join("docs")
    }
}

impl DocumentRegistry for FsDocumentRegistry {
    fn documents(&self, scope: &Scope) -> Result<Vec<RawDocument>> {
        let dir = self.docs_dir(scope);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read docs directory: {}", dir.display()),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| MnemoError::Io {
                source: e,
                context: "Failed to read docs directory entry".to_string(),
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            // stored as "<doc_id>-<filename>"; tolerate bare names
            let (id, filename) = match name.split_once('-') {
                Some((id, filename)) => (id.to_string(), filename.to_string()),
                None => (name.clone(), name.clone()),
            };

            documents.push(RawDocument { id, filename, path });
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(documents)
    }

    fn read(&self, doc: &RawDocument) -> Result<Vec<u8>> {
        fs::read(&doc.path).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read raw document: {}", doc.path.display()),
        })
    }

    fn store(
        &self,
        scope: &Scope,
        doc_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<RawDocument> {
        let dir = self.docs_dir(scope);
        fs::create_dir_all(&dir).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to create docs directory: {}", dir.display()),
        })?;

        let safe_name = sanitize_file_name(filename);
        let path = dir.join(format!("{doc_id}-{safe_name}"));
        fs::write(&path, bytes).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to write raw document: {}", path.display()),
        })?;

        Ok(RawDocument {
            id: doc_id.to_string(),
            filename: safe_name,
            path,
        })
    }
}

/// Strip path separators so a hostile filename cannot escape the docs dir
fn sanitize_file_name(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed");
    base.replace(['/', '\\'], "_")
}
