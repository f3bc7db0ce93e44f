//! Hybrid retrain control loop
//!
//! Decides when and what to re-index. Two signals drive it: low average
//! retrieval confidence (self-healing full reindex) and explicit user
//! feedback (synthetic correction/reinforcement documents). Reindex and
//! correction work runs on detached background tasks after the triggering
//! request has already returned; failures there are logged and never
//! propagate to the caller.

use crate::chunking::{chunk_with_strategy, ChunkingSpec};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::extract::TextExtractor;
use crate::registry::DocumentRegistry;
use crate::store::{ChunkMeta, Collection, DocOwner, IndexStore, Scope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Source marker for auto-saved question/answer memories
pub const SYNTHETIC_SOURCE: &str = "__synthetic__";
/// Source marker for user-supplied corrections
pub const FEEDBACK_SOURCE: &str = "__user_feedback__";
/// Source marker for reinforcement of confirmed answers
pub const REINFORCE_SOURCE: &str = "__reinforce__";

/// Whether a chunk was written back by the engine rather than extracted from
/// a source document
pub fn is_synthetic_source(source_name: &str) -> bool {
    matches!(
        source_name,
        SYNTHETIC_SOURCE | FEEDBACK_SOURCE | REINFORCE_SOURCE
    )
}

/// What set a retrain in motion
#[derive(Debug, Clone)]
pub enum RetrainTrigger {
    /// Average retrieval confidence fell below the configured threshold
    LowConfidence,
    /// The user marked an answer incorrect and supplied a better one
    UserCorrection {
        query: String,
        better_answer: String,
    },
    /// The user confirmed an answer as correct
    UserReinforcement { query: String, answer: String },
}

/// Retrain thresholds and knobs.
///
/// The defaults mirror the tuning this engine shipped with; none of them are
/// load-bearing invariants, so they stay configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainConfig {
    /// Average-score floor below which a full reindex is scheduled
    pub auto_retrain_threshold: f32,
    /// Novelty threshold for synthetic-memory writes
    pub memory_dedup_threshold: f32,
    /// Novelty threshold for the maintenance rebuild pass
    pub rebuild_dedup_threshold: f32,
    /// Fixed chunk size used when re-chunking short synthetic memories
    pub synthetic_chunk_size: usize,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            auto_retrain_threshold: 0.55,
            memory_dedup_threshold: 0.95,
            rebuild_dedup_threshold: 0.97,
            synthetic_chunk_size: 500,
        }
    }
}

/// Orchestrates background index maintenance for one engine instance
#[derive(Clone)]
pub struct RetrainController {
    store: IndexStore,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    registry: Arc<dyn DocumentRegistry>,
    chunking: ChunkingSpec,
    config: RetrainConfig,
}

impl RetrainController {
    pub fn new(
        store: IndexStore,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn TextExtractor>,
        registry: Arc<dyn DocumentRegistry>,
        chunking: ChunkingSpec,
        config: RetrainConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            registry,
            chunking,
            config,
        }
    }

    pub fn config(&self) -> &RetrainConfig {
        &self.config
    }

    /// Feed the confidence signal for one answered query. Schedules a
    /// background full reindex when it falls below the threshold; returns
    /// whether one was scheduled.
    pub async fn observe(&self, scope: &Scope, avg_score: f32) -> bool {
        if avg_score >= self.config.auto_retrain_threshold {
            return false;
        }

        tracing::info!(
            "Average retrieval score {:.3} below threshold {:.3} for {}; scheduling reindex",
            avg_score,
            self.config.auto_retrain_threshold,
            scope
        );
        self.spawn(scope, RetrainTrigger::LowConfidence);
        true
    }

    /// Entry point for explicitly requested retraining.
    ///
    /// Low-confidence and correction triggers run in the background;
    /// reinforcement runs inline because the caller wants the dedup verdict
    /// before returning.
    pub async fn schedule(&self, scope: &Scope, trigger: RetrainTrigger) -> Result<()> {
        match trigger {
            RetrainTrigger::UserReinforcement { query, answer } => {
                self.reinforce(scope, &query, &answer).await?;
                Ok(())
            }
            trigger => {
                self.spawn(scope, trigger);
                Ok(())
            }
        }
    }

    /// Auto-memory: write back the question/answer pair as a retrievable
    /// chunk unless a near-duplicate already exists. Returns the synthetic
    /// document id when something was written.
    pub async fn save_memory(
        &self,
        scope: &Scope,
        query: &str,
        answer: &str,
    ) -> Result<Option<String>> {
        let owner = DocOwner::global(format!("synthetic-{}", Uuid::new_v4()));
        let doc_id = owner.to_string();
        let text = synthesize(query, answer);

        let added = self
            .store
            .append_unique(
                scope,
                &text,
                owner,
                SYNTHETIC_SOURCE,
                &ChunkingSpec::default(),
                self.config.memory_dedup_threshold,
            )
            .await?;

        Ok((added > 0).then_some(doc_id))
    }

    /// Reinforcement: immediately append the confirmed answer, gated by the
    /// synthetic-memory novelty check. Returns the number of chunks added.
    pub async fn reinforce(&self, scope: &Scope, query: &str, answer: &str) -> Result<usize> {
        let owner = DocOwner::global(format!("reinforce-{}", Uuid::new_v4()));
        self.store
            .append_unique(
                scope,
                &synthesize(query, answer),
                owner,
                REINFORCE_SOURCE,
                &ChunkingSpec::default(),
                self.config.memory_dedup_threshold,
            )
            .await
    }

    fn spawn(&self, scope: &Scope, trigger: RetrainTrigger) {
        let controller = self.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            let outcome = match trigger {
                RetrainTrigger::LowConfidence => controller.reindex(&scope).await,
                RetrainTrigger::UserCorrection {
                    query,
                    better_answer,
                } => controller.append_correction(&scope, &query, &better_answer).await,
                RetrainTrigger::UserReinforcement { query, answer } => {
                    controller.reinforce(&scope, &query, &answer).await
                }
            };

            // the triggering request has already been answered; background
            // failures must not surface to it
            match outcome {
                Ok(chunks) => {
                    tracing::info!("Background retrain for {} finished ({} chunks)", scope, chunks)
                }
                Err(e) => tracing::error!("Background retrain for {} failed: {}", scope, e),
            }
        });
    }

    /// Full reindex: re-extract every stored raw document under the scope,
    /// re-chunk with the scope's configured strategy and replace the
    /// collection wholesale. The replacement is built fully in memory and
    /// installed as the last step.
    pub(crate) async fn reindex(&self, scope: &Scope) -> Result<usize> {
        let documents = self.registry.documents(scope)?;

        let mut chunks: Vec<String> = Vec::new();
        let mut tags: Vec<(DocOwner, String)> = Vec::new();

        for doc in documents {
            let bytes = match self.registry.read(&doc) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Reindex skipping {}: {}", doc.path.display(), e);
                    continue;
                }
            };
            let text = self.extractor.extract(&bytes, &doc.filename, "");
            if text.trim().is_empty() {
                continue;
            }

            let owner = scope.default_owner(&doc.id);
            for chunk in chunk_with_strategy(&text, &self.chunking, self.embedder.as_ref())? {
                chunks.push(chunk);
                tags.push((owner.clone(), doc.filename.clone()));
            }
        }

        if chunks.is_empty() {
            tracing::warn!("Reindex for {} found no extractable documents", scope);
            self.store.clear(scope).await?;
            return Ok(0);
        }

        let embeddings = self.embedder.embed_batch(&chunks)?;
        let total = chunks.len();
        let vectors = crate::store::to_matrix(embeddings)?;

        let meta = chunks
            .into_iter()
            .zip(tags)
            .enumerate()
            .map(|(i, (text, (owner, source_name)))| ChunkMeta {
                text,
                owner,
                source_name,
                sequence: i as u64,
            })
            .collect();

        self.store
            .replace(scope, Collection::new(vectors, meta)?)
            .await?;
        Ok(total)
    }

    /// Single synthetic correction document, chunked with fixed defaults
    async fn append_correction(
        &self,
        scope: &Scope,
        query: &str,
        better_answer: &str,
    ) -> Result<usize> {
        let owner = DocOwner::global(format!("feedback-{}", Uuid::new_v4()));
        self.store
            .append(
                scope,
                &synthesize(query, better_answer),
                owner,
                FEEDBACK_SOURCE,
                &ChunkingSpec::default(),
            )
            .await
    }
}

/// Format a question/answer exchange as one synthetic text blob
pub fn synthesize(query: &str, answer: &str) -> String {
    format!("Q: {query}\nA: {answer}")
}
