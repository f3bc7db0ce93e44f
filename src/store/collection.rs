//! In-memory representation of one scope's collection: N metadata records
//! paired 1:1, by position, with N unit-norm embedding vectors.

use crate::error::{MnemoError, Result};
use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ownership tag of a chunk, used for search-time filtering.
///
/// Serialized as the composite string form: a plain document identifier for
/// global chunks, `"<agent>:<doc>"` for agent-scoped ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DocOwner {
    Global(String),
    AgentScoped { agent: String, doc: String },
}

impl DocOwner {
    pub fn global(doc: impl Into<String>) -> Self {
        DocOwner::Global(doc.into())
    }

    pub fn agent_scoped(agent: impl Into<String>, doc: impl Into<String>) -> Self {
        DocOwner::AgentScoped {
            agent: agent.into(),
            doc: doc.into(),
        }
    }

    /// Ownership filter check: the tag matches when it equals the filter
    /// exactly, or when it is scoped under it (`"<filter>:..."`). One
    /// mechanism covers both "restrict to one raw document" and "restrict to
    /// one agent's documents".
    pub fn matches(&self, filter: &str) -> bool {
        let tag = self.to_string();
        tag == filter || tag.starts_with(&format!("{filter}:"))
    }
}

impl fmt::Display for DocOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocOwner::Global(doc) => f.write_str(doc),
            DocOwner::AgentScoped { agent, doc } => write!(f, "{agent}:{doc}"),
        }
    }
}

impl From<DocOwner> for String {
    fn from(owner: DocOwner) -> Self {
        owner.to_string()
    }
}

impl From<String> for DocOwner {
    fn from(tag: String) -> Self {
        match tag.split_once(':') {
            Some((agent, doc)) => DocOwner::AgentScoped {
                agent: agent.to_string(),
                doc: doc.to_string(),
            },
            None => DocOwner::Global(tag),
        }
    }
}

impl From<&str> for DocOwner {
    fn from(tag: &str) -> Self {
        DocOwner::from(tag.to_string())
    }
}

/// Metadata record for one stored chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Chunk text
    pub text: String,
    /// Ownership tag for search-time filtering
    pub owner: DocOwner,
    /// Human-readable source (filename or synthetic marker)
    pub source_name: String,
    /// Append position, assigned once and never reused or reordered
    pub sequence: u64,
}

/// One scope's collection: vectors and metadata, paired by position.
///
/// The parity invariant `vectors.nrows() == meta.len()` is the central
/// correctness invariant of the engine; every constructor and mutation
/// enforces it.
#[derive(Debug, Clone)]
pub struct Collection {
    vectors: Array2<f32>,
    meta: Vec<ChunkMeta>,
}

impl Collection {
    /// Build a collection from its two halves, enforcing parity
    pub fn new(vectors: Array2<f32>, meta: Vec<ChunkMeta>) -> Result<Self> {
        if vectors.nrows() != meta.len() {
            return Err(MnemoError::ParityViolation {
                vectors: vectors.nrows(),
                metadata: meta.len(),
            });
        }
        Ok(Self { vectors, meta })
    }

    /// An empty collection of the given dimensionality
    pub fn empty(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
            meta: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn meta(&self) -> &[ChunkMeta] {
        &self.meta
    }

    /// Next free sequence value (continues from the previous maximum)
    pub fn next_sequence(&self) -> u64 {
        self.meta.last().map(|m| m.sequence + 1).unwrap_or(0)
    }

    /// Concatenate new rows after the existing ones, in append order.
    ///
    /// Both halves grow together or not at all.
    pub fn append(&mut self, vectors: Array2<f32>, meta: Vec<ChunkMeta>) -> Result<()> {
        if vectors.nrows() != meta.len() {
            return Err(MnemoError::ParityViolation {
                vectors: vectors.nrows(),
                metadata: meta.len(),
            });
        }
        if !self.meta.is_empty() && vectors.ncols() != self.dimension() {
            return Err(MnemoError::Encode(format!(
                "embedding dimension changed: collection has {}, new rows have {}",
                self.dimension(),
                vectors.ncols()
            )));
        }

        let combined = if self.meta.is_empty() {
            vectors
        } else {
            concatenate(Axis(0), &[self.vectors.view(), vectors.view()])
                .map_err(|e| MnemoError::Encode(e.to_string()))?
        };

        self.vectors = combined;
        self.meta.extend(meta);
        Ok(())
    }
}
