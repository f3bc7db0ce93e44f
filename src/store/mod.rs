//! Scope-addressed persistent index store
//!
//! Each scope owns one collection persisted as a pair of co-located files:
//! `vectors.bin` (bincode-encoded matrix) and `meta.json` (chunk records).
//! The pair is treated as one logical record: every read-modify-write runs
//! under a per-scope async mutex and both halves are written with
//! temp-file + fsync + rename before a mutation is considered complete.

mod collection;

pub use collection::{ChunkMeta, Collection, DocOwner};

use crate::chunking::{chunk_with_strategy, ChunkingSpec};
use crate::dedup::is_novel;
use crate::embedding::EmbeddingProvider;
use crate::error::{MnemoError, Result};
use ahash::AHashMap;
use ndarray::{s, Array2, ArrayView1};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const VECTORS_FILE: &str = "vectors.bin";
const META_FILE: &str = "meta.json";

/// Addressable unit of one independent collection: a user's global index or
/// one agent's index. Two scopes never share chunks, vectors or locks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    User(String),
    Agent { user: String, agent: String },
}

impl Scope {
    pub fn user(id: impl Into<String>) -> Self {
        Scope::User(id.into())
    }

    pub fn agent(user: impl Into<String>, agent: impl Into<String>) -> Self {
        Scope::Agent {
            user: user.into(),
            agent: agent.into(),
        }
    }

    /// Stable key used for the lock table and error messages
    pub fn key(&self) -> String {
        match self {
            Scope::User(user) => format!("user:{user}"),
            Scope::Agent { user, agent } => format!("agent:{user}:{agent}"),
        }
    }

    /// On-disk home of this scope's collection, raw docs and history
    pub fn dir(&self, root: &Path) -> PathBuf {
        match self {
            Scope::User(user) => root.join("users").join(user),
            Scope::Agent { user, agent } => root
                .join("users")
                .join(user)
                .join("agents")
                .join(agent),
        }
    }

    /// Ownership tag for a raw document indexed into this scope
    pub fn default_owner(&self, doc_id: &str) -> DocOwner {
        match self {
            Scope::User(_) => DocOwner::global(doc_id),
            Scope::Agent { agent, .. } => DocOwner::agent_scoped(agent.clone(), doc_id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Persistent collection store with per-scope write serialization
#[derive(Clone)]
pub struct IndexStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    locks: std::sync::Mutex<AHashMap<String, Arc<Mutex<()>>>>,
}

impl IndexStore {
    pub fn new(root: PathBuf, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root,
                embedder,
                locks: std::sync::Mutex::new(AHashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn scope_dir(&self, scope: &Scope) -> PathBuf {
        scope.dir(&self.inner.root)
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    /// Chunk, embed and append text to the scope's collection.
    ///
    /// Returns the number of chunks added. A zero-chunk input returns 0 with
    /// no side effect so that "collection exists" stays meaningful.
    pub async fn append(
        &self,
        scope: &Scope,
        text: &str,
        owner: DocOwner,
        source_name: &str,
        spec: &ChunkingSpec,
    ) -> Result<usize> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;
        self.append_unlocked(scope, text, owner, source_name, spec)
    }

    /// Append only if the text is novel with respect to the scope's existing
    /// vectors: the whole-text embedding must score strictly below
    /// `threshold` against every stored row. Returns 0 when skipped.
    pub async fn append_unique(
        &self,
        scope: &Scope,
        text: &str,
        owner: DocOwner,
        source_name: &str,
        spec: &ChunkingSpec,
        threshold: f32,
    ) -> Result<usize> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        match self.load_unlocked(scope) {
            Ok(collection) if !collection.is_empty() => {
                let candidate = self.inner.embedder.embed(text)?;
                if !is_novel(
                    ArrayView1::from(&candidate[..]),
                    collection.vectors().view(),
                    threshold,
                ) {
                    tracing::debug!(
                        "Skipping near-duplicate append to {} (threshold {})",
                        scope,
                        threshold
                    );
                    return Ok(0);
                }
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.append_unlocked(scope, text, owner, source_name, spec)
    }

    /// Load the scope's collection as an in-memory snapshot.
    ///
    /// Fails with `CollectionNotFound` when either half is absent.
    pub async fn load(&self, scope: &Scope) -> Result<Collection> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;
        self.load_unlocked(scope)
    }

    /// Remove the scope's collection files
    pub async fn clear(&self, scope: &Scope) -> Result<()> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;
        self.clear_unlocked(scope)
    }

    /// Atomically install a fully-built collection, replacing whatever the
    /// scope held before (the rebuild path; not an append).
    pub async fn replace(&self, scope: &Scope, collection: Collection) -> Result<()> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;
        self.persist_unlocked(scope, &collection)
    }

    /// Number of chunks indexed for the scope (0 when nothing is indexed)
    pub async fn count(&self, scope: &Scope) -> Result<usize> {
        match self.load(scope).await {
            Ok(collection) => Ok(collection.len()),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Whether the scope has a persisted collection
    pub fn exists(&self, scope: &Scope) -> bool {
        let dir = self.scope_dir(scope);
        dir.join(VECTORS_FILE).exists() && dir.join(META_FILE).exists()
    }

    fn scope_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().expect("lock table poisoned");
        locks
            .entry(scope.key())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn append_unlocked(
        &self,
        scope: &Scope,
        text: &str,
        owner: DocOwner,
        source_name: &str,
        spec: &ChunkingSpec,
    ) -> Result<usize> {
        let chunks = chunk_with_strategy(text, spec, self.inner.embedder.as_ref())?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.inner.embedder.embed_batch(&chunks)?;
        let rows = to_matrix(embeddings)?;

        let mut collection = match self.load_unlocked(scope) {
            Ok(collection) => collection,
            Err(e) if e.is_not_found() => Collection::empty(rows.ncols()),
            Err(e) => return Err(e),
        };

        let added = chunks.len();
        let mut sequence = collection.next_sequence();
        let meta = chunks
            .into_iter()
            .map(|text| {
                let record = ChunkMeta {
                    text,
                    owner: owner.clone(),
                    source_name: source_name.to_string(),
                    sequence,
                };
                sequence += 1;
                record
            })
            .collect();

        collection.append(rows, meta)?;
        self.persist_unlocked(scope, &collection)?;

        tracing::debug!("Appended {} chunks to {}", added, scope);
        Ok(added)
    }

    fn load_unlocked(&self, scope: &Scope) -> Result<Collection> {
        let dir = self.scope_dir(scope);
        let vectors_path = dir.join(VECTORS_FILE);
        let meta_path = dir.join(META_FILE);

        if !vectors_path.exists() || !meta_path.exists() {
            return Err(MnemoError::CollectionNotFound { scope: scope.key() });
        }

        let raw = fs::read(&vectors_path).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read vector file: {}", vectors_path.display()),
        })?;
        let mut vectors: Array2<f32> = bincode::deserialize(&raw).map_err(|e| {
            MnemoError::Encode(format!(
                "Failed to decode vector file {}: {e}",
                vectors_path.display()
            ))
        })?;

        let raw = fs::read(&meta_path).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read metadata file: {}", meta_path.display()),
        })?;
        let mut meta = decode_meta_tolerant(&raw, &meta_path);

        // Defensive reconciliation only: this engine's own writes always keep
        // the two halves aligned.
        if vectors.nrows() != meta.len() {
            let keep = vectors.nrows().min(meta.len());
            tracing::warn!(
                "Vector/metadata mismatch for {} ({} vectors, {} records); truncating to {}",
                scope,
                vectors.nrows(),
                meta.len(),
                keep
            );
            vectors = vectors.slice(s![..keep, ..]).to_owned();
            meta.truncate(keep);
        }

        Collection::new(vectors, meta)
    }

    fn clear_unlocked(&self, scope: &Scope) -> Result<()> {
        let dir = self.scope_dir(scope);
        for name in [VECTORS_FILE, META_FILE] {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| MnemoError::Io {
                    source: e,
                    context: format!("Failed to delete {}", path.display()),
                })?;
            }
        }
        Ok(())
    }

    fn persist_unlocked(&self, scope: &Scope, collection: &Collection) -> Result<()> {
        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to create scope directory: {}", dir.display()),
        })?;

        let encoded = bincode::serialize(collection.vectors())
            .map_err(|e| MnemoError::Encode(format!("Failed to encode vectors: {e}")))?;
        write_atomic(&dir.join(VECTORS_FILE), &encoded)?;

        let json = serde_json::to_vec_pretty(collection.meta()).map_err(|e| MnemoError::Json {
            source: e,
            context: format!("Failed to encode metadata for {scope}"),
        })?;
        write_atomic(&dir.join(META_FILE), &json)?;

        Ok(())
    }
}

/// Write data to a temporary file, fsync, then atomically rename into place
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MnemoError::Config(format!("Invalid file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = fs::File::create(&tmp_path).map_err(|e| MnemoError::Io {
        source: e,
        context: format!("Failed to create temp file: {}", tmp_path.display()),
    })?;
    file.write_all(data).map_err(|e| MnemoError::Io {
        source: e,
        context: format!("Failed to write temp file: {}", tmp_path.display()),
    })?;
    file.sync_all().map_err(|e| MnemoError::Io {
        source: e,
        context: format!("Failed to sync temp file: {}", tmp_path.display()),
    })?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| MnemoError::Io {
        source: e,
        context: format!(
            "Failed to rename temp file into place: {} -> {}",
            tmp_path.display(),
            path.display()
        ),
    })?;

    Ok(())
}

/// Best-effort metadata decoding: skip malformed records instead of failing
/// the whole load
fn decode_meta_tolerant(bytes: &[u8], path: &Path) -> Vec<ChunkMeta> {
    let text = String::from_utf8_lossy(bytes);

    let values: Vec<serde_json::Value> = match serde_json::from_str(&text) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!(
                "Metadata file {} is unparseable ({}); recovering as empty",
                path.display(),
                e
            );
            return Vec::new();
        }
    };

    let total = values.len();
    let meta: Vec<ChunkMeta> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping malformed metadata record in {}: {}",
                    path.display(),
                    e
                );
                None
            }
        })
        .collect();

    if meta.len() < total {
        tracing::warn!(
            "Recovered {}/{} metadata records from {}",
            meta.len(),
            total,
            path.display()
        );
    }

    meta
}

/// Stack embedding rows into an N×D matrix
pub(crate) fn to_matrix(rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let n = rows.len();
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut flat = Vec::with_capacity(n * dim);
    for row in &rows {
        if row.len() != dim {
            return Err(MnemoError::Encode(
                "Embedding batch produced ragged rows".to_string(),
            ));
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((n, dim), flat).map_err(|e| MnemoError::Encode(e.to_string()))
}
