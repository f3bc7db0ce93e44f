//! Engine facade
//!
//! Wires the chunker, store, search, dedup, retrain controller and rebuilder
//! into the interface exposed upward: index, search, answer, feedback,
//! rebuild, schedule_retrain and status. The embedder, generator, extractor
//! and document registry are injected long-lived collaborators; the engine
//! itself holds no global state beyond the store's per-scope lock table.

use crate::chunking::ChunkingSpec;
use crate::config::{Config, QueryConfig};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::Result;
use crate::extract::{PlainTextExtractor, TextExtractor};
use crate::generation::{build_prompt, GenerationError, Generator, MAX_NEW_TOKENS_CAP};
use crate::history::{ChatHistory, Message};
use crate::maintenance::{RebuildStats, Rebuilder};
use crate::registry::{DocumentRegistry, FsDocumentRegistry};
use crate::retrain::{RetrainController, RetrainTrigger};
use crate::search::{average_score, SearchHit};
use crate::store::{IndexStore, Scope};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One question against a scope's collection
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    /// Number of chunks to retrieve (0 means the configured default)
    pub k: usize,
    /// Token budget for the generated answer, capped at 256
    pub max_new_tokens: usize,
    /// Optional ownership filter restricting retrieval
    pub owner_filter: Option<String>,
    /// Whether to auto-save the exchange as a synthetic memory
    pub save_memory: bool,
}

/// Result of one answered question
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SearchHit>,
    pub avg_score: f32,
    pub memory_saved: bool,
    pub memory_doc_id: Option<String>,
    pub retrain_scheduled: bool,
}

/// Explicit user verdict on an answer
#[derive(Debug, Clone, Deserialize)]
pub struct Feedback {
    pub query: String,
    pub correct: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub better_answer: Option<String>,
}

/// What the engine did with a piece of feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// A background correction retrain was scheduled
    RetrainScheduled,
    /// A reinforcement document was appended (or skipped as a duplicate)
    Reinforced { added: bool },
    /// Nothing actionable in the feedback
    Ignored,
}

/// The retrieval/self-learning engine
#[derive(Clone)]
pub struct Engine {
    store: IndexStore,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Option<Arc<dyn Generator>>,
    extractor: Arc<dyn TextExtractor>,
    registry: Arc<dyn DocumentRegistry>,
    retrain: RetrainController,
    rebuilder: Rebuilder,
    chunking: ChunkingSpec,
    query_defaults: QueryConfig,
    data_dir: PathBuf,
}

impl Engine {
    /// Build an engine from validated configuration and injected collaborators
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn Generator>>,
        extractor: Arc<dyn TextExtractor>,
        registry: Arc<dyn DocumentRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let data_dir = config.storage.data_dir.clone();
        let store = IndexStore::new(data_dir.clone(), embedder.clone());
        let retrain = RetrainController::new(
            store.clone(),
            embedder.clone(),
            extractor.clone(),
            registry.clone(),
            config.chunking.clone(),
            config.retrain.clone(),
        );
        let rebuilder = Rebuilder::new(
            store.clone(),
            embedder.clone(),
            extractor.clone(),
            registry.clone(),
            config.retrain.clone(),
        );

        Ok(Self {
            store,
            embedder,
            generator,
            extractor,
            registry,
            retrain,
            rebuilder,
            chunking: config.chunking.clone(),
            query_defaults: config.query.clone(),
            data_dir,
        })
    }

    /// Open an engine with the default local collaborators: a FastEmbed
    /// embedding model, the plain-text extractor and the filesystem document
    /// registry. No generator is attached; `answer` requires one.
    pub fn open(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
        let extractor: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        let registry: Arc<dyn DocumentRegistry> =
            Arc::new(FsDocumentRegistry::new(config.storage.data_dir.clone()));
        Self::new(config, embedder, None, extractor, registry)
    }

    /// Attach a generation backend
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// An answer request with this engine's configured defaults
    pub fn request(&self, query: impl Into<String>) -> AnswerRequest {
        AnswerRequest {
            query: query.into(),
            k: self.query_defaults.default_k,
            max_new_tokens: self.query_defaults.default_max_new_tokens,
            owner_filter: None,
            save_memory: true,
        }
    }

    /// Store a raw document under the scope and append its extracted text to
    /// the scope's collection. Returns the number of chunks added.
    pub async fn index_document(
        &self,
        scope: &Scope,
        doc_id: &str,
        filename: &str,
        mime_hint: &str,
        bytes: &[u8],
    ) -> Result<usize> {
        let doc = self.registry.store(scope, doc_id, filename, bytes)?;
        let text = self.extractor.extract(bytes, &doc.filename, mime_hint);
        let owner = scope.default_owner(&doc.id);
        self.store
            .append(scope, &text, owner, &doc.filename, &self.chunking)
            .await
    }

    /// Retrieve the top-k chunks for a query, most similar first
    pub async fn search(
        &self,
        scope: &Scope,
        query: &str,
        k: usize,
        owner_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let collection = self.store.load(scope).await?;
        let query_vector = self.embedder.embed(query)?;
        Ok(crate::search::search(
            &query_vector,
            &collection,
            k,
            owner_filter,
        ))
    }

    /// Answer a question against the scope's collection.
    ///
    /// Retrieves context, generates an answer, auto-saves the exchange as a
    /// synthetic memory when novel, feeds the confidence signal to the
    /// retrain controller and records the exchange in the scope's history.
    /// A generation failure surfaces to the caller; the background machinery
    /// never does.
    pub async fn answer(&self, scope: &Scope, request: AnswerRequest) -> Result<AnswerResponse> {
        let k = if request.k == 0 {
            self.query_defaults.default_k
        } else {
            request.k
        };
        let max_new_tokens = request
            .max_new_tokens
            .clamp(1, MAX_NEW_TOKENS_CAP);

        let hits = self
            .search(scope, &request.query, k, request.owner_filter.as_deref())
            .await?;
        let avg_score = average_score(&hits);

        let context: String = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(&context, &request.query);

        let generator = self.generator.as_ref().ok_or(GenerationError::Disabled)?;
        let answer = generator.generate(&prompt, max_new_tokens)?;

        let (memory_saved, memory_doc_id) = if request.save_memory {
            match self.retrain.save_memory(scope, &request.query, &answer).await {
                Ok(Some(doc_id)) => (true, Some(doc_id)),
                Ok(None) => (false, None),
                Err(e) => {
                    // memory write-back must not invalidate the answer
                    tracing::warn!("Memory save failed for {}: {}", scope, e);
                    (false, None)
                }
            }
        } else {
            (false, None)
        };

        let retrain_scheduled = self.retrain.observe(scope, avg_score).await;

        if let Err(e) = self.history(scope).append(vec![
            Message::user(request.query.as_str()),
            Message::assistant(answer.as_str(), hits.clone(), avg_score),
        ]) {
            tracing::warn!("History append failed for {}: {}", scope, e);
        }

        Ok(AnswerResponse {
            answer,
            sources: hits,
            avg_score,
            memory_saved,
            memory_doc_id,
            retrain_scheduled,
        })
    }

    /// Apply explicit user feedback on an answered query
    pub async fn feedback(&self, scope: &Scope, feedback: Feedback) -> Result<FeedbackOutcome> {
        if feedback.correct {
            let answer = feedback.answer.unwrap_or_default();
            let added = self.retrain.reinforce(scope, &feedback.query, &answer).await?;
            return Ok(FeedbackOutcome::Reinforced { added: added > 0 });
        }

        if let Some(better_answer) = feedback.better_answer {
            self.retrain
                .schedule(
                    scope,
                    RetrainTrigger::UserCorrection {
                        query: feedback.query,
                        better_answer,
                    },
                )
                .await?;
            return Ok(FeedbackOutcome::RetrainScheduled);
        }

        Ok(FeedbackOutcome::Ignored)
    }

    /// Explicitly schedule retraining work for a scope
    pub async fn schedule_retrain(&self, scope: &Scope, trigger: RetrainTrigger) -> Result<()> {
        self.retrain.schedule(scope, trigger).await
    }

    /// Rebuild the scope's collection from raw documents and synthetic
    /// memories, deduplicated
    pub async fn rebuild(&self, scope: &Scope) -> Result<RebuildStats> {
        self.rebuilder.rebuild(scope).await
    }

    /// Number of chunks indexed for the scope
    pub async fn status(&self, scope: &Scope) -> Result<usize> {
        self.store.count(scope).await
    }

    /// Handle to the scope's chat history
    pub fn history(&self, scope: &Scope) -> ChatHistory {
        ChatHistory::for_scope(&self.data_dir, scope)
    }
}
