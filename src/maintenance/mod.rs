//! Maintenance rebuilder
//!
//! Batch job that re-derives a scope's collection from first principles: raw
//! source documents plus previously accumulated synthetic memories, globally
//! deduplicated. Unlike the store's default append mode this is a full
//! replacement, built entirely in memory and installed atomically.

use crate::chunking::{chunk_fixed, ChunkingSpec};
use crate::dedup::dedup_incremental;
use crate::embedding::EmbeddingProvider;
use crate::error::{MnemoError, Result};
use crate::extract::TextExtractor;
use crate::registry::DocumentRegistry;
use crate::retrain::{is_synthetic_source, RetrainConfig};
use crate::store::{to_matrix, ChunkMeta, Collection, DocOwner, IndexStore, Scope};
use ndarray::Axis;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RebuildStats {
    /// Candidate chunks before deduplication
    pub total_chunks: usize,
    /// Chunks retained after the incremental dedup pass
    pub unique_chunks: usize,
    /// Synthetic memory chunks that fed the rebuild
    pub synthetic_items: usize,
}

/// Rebuilds one scope's collection from raw documents and synthetic memories
#[derive(Clone)]
pub struct Rebuilder {
    store: IndexStore,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    registry: Arc<dyn DocumentRegistry>,
    config: RetrainConfig,
}

impl Rebuilder {
    pub fn new(
        store: IndexStore,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn TextExtractor>,
        registry: Arc<dyn DocumentRegistry>,
        config: RetrainConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            registry,
            config,
        }
    }

    /// Rebuild the scope's collection.
    ///
    /// Raw documents are re-chunked with the default fixed parameters;
    /// synthetic memories with a smaller fixed window since corrective
    /// snippets are short. The combined candidate set is embedded in one
    /// batch, deduplicated incrementally in original order, and installed as
    /// a wholesale replacement.
    pub async fn rebuild(&self, scope: &Scope) -> Result<RebuildStats> {
        let defaults = ChunkingSpec::default();

        let mut chunks: Vec<String> = Vec::new();
        let mut tags: Vec<(DocOwner, String)> = Vec::new();

        for doc in self.registry.documents(scope)? {
            let bytes = match self.registry.read(&doc) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Rebuild skipping {}: {}", doc.path.display(), e);
                    continue;
                }
            };
            let text = self.extractor.extract(&bytes, &doc.filename, "");
            if text.trim().is_empty() {
                continue;
            }

            let owner = scope.default_owner(&doc.id);
            for chunk in chunk_fixed(&text, defaults.chunk_size, defaults.overlap)? {
                chunks.push(chunk);
                tags.push((owner.clone(), doc.filename.clone()));
            }
        }

        let synthetic_blocks: Vec<(DocOwner, String, String)> = match self.store.load(scope).await
        {
            Ok(collection) => collection
                .meta()
                .iter()
                .filter(|m| is_synthetic_source(&m.source_name))
                .map(|m| (m.owner.clone(), m.source_name.clone(), m.text.clone()))
                .collect(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let synthetic_items = synthetic_blocks.len();

        for (owner, source_name, text) in synthetic_blocks {
            for chunk in chunk_fixed(&text, self.config.synthetic_chunk_size, defaults.overlap)? {
                chunks.push(chunk);
                tags.push((owner.clone(), source_name.clone()));
            }
        }

        if chunks.is_empty() {
            return Err(MnemoError::NothingToRebuild { scope: scope.key() });
        }

        let total_chunks = chunks.len();
        let vectors = to_matrix(self.embedder.embed_batch(&chunks)?)?;

        let kept = dedup_incremental(&vectors, self.config.rebuild_dedup_threshold);
        let unique_vectors = vectors.select(Axis(0), &kept);
        let unique_meta: Vec<ChunkMeta> = kept
            .iter()
            .enumerate()
            .map(|(sequence, &i)| ChunkMeta {
                text: chunks[i].clone(),
                owner: tags[i].0.clone(),
                source_name: tags[i].1.clone(),
                sequence: sequence as u64,
            })
            .collect();
        let unique_chunks = unique_meta.len();

        self.store
            .replace(scope, Collection::new(unique_vectors, unique_meta)?)
            .await?;

        tracing::info!(
            "Rebuilt {}: {} candidates, {} unique, {} synthetic blocks",
            scope,
            total_chunks,
            unique_chunks,
            synthetic_items
        );

        Ok(RebuildStats {
            total_chunks,
            unique_chunks,
            synthetic_items,
        })
    }
}
