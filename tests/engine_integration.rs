//! Engine integration: answer flow, auto-memory, feedback and retrain loop

mod common;

use common::{FailingGenerator, MockEmbedder, MockGenerator};
use mnemo::config::Config;
use mnemo::engine::{Engine, Feedback, FeedbackOutcome};
use mnemo::error::MnemoError;
use mnemo::extract::PlainTextExtractor;
use mnemo::registry::FsDocumentRegistry;
use mnemo::retrain::{FEEDBACK_SOURCE, REINFORCE_SOURCE, SYNTHETIC_SOURCE};
use mnemo::store::{DocOwner, Scope};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_engine(temp: &TempDir, generator: Option<Arc<dyn mnemo::generation::Generator>>) -> Engine {
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();

    let registry = Arc::new(FsDocumentRegistry::new(temp.path().to_path_buf()));
    Engine::new(
        &config,
        Arc::new(MockEmbedder),
        generator,
        Arc::new(PlainTextExtractor),
        registry,
    )
    .unwrap()
}

/// Wait for a background task to bring the scope's chunk count to `expected`
async fn wait_for_count(engine: &Engine, scope: &Scope, expected: usize) -> usize {
    for _ in 0..200 {
        let count = engine.status(scope).await.unwrap();
        if count == expected {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.status(scope).await.unwrap()
}

#[tokio::test]
async fn test_answer_saves_memory_once() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, Some(Arc::new(MockGenerator::answering("Azure."))));
    let scope = Scope::user("alice");

    let indexed = engine
        .index_document(&scope, "doc1", "sky.txt", "text/plain", b"The sky is blue.")
        .await
        .unwrap();
    assert_eq!(indexed, 1);

    // first answer: high confidence, memory saved
    let response = engine.answer(&scope, engine.request("the sky is blue")).await.unwrap();
    assert_eq!(response.answer, "Azure.");
    assert!(!response.sources.is_empty());
    assert!(response.avg_score > 0.9);
    assert!(!response.retrain_scheduled);
    assert!(response.memory_saved);
    assert!(response.memory_doc_id.is_some());
    assert_eq!(engine.status(&scope).await.unwrap(), 2);

    // same question again: the synthetic memory already exists, so the dedup
    // check suppresses a second copy
    let response = engine.answer(&scope, engine.request("the sky is blue")).await.unwrap();
    assert!(!response.memory_saved);
    assert!(response.memory_doc_id.is_none());
    assert_eq!(engine.status(&scope).await.unwrap(), 2);

    // the saved memory is retrievable and tagged as synthetic
    let collection = engine.store().load(&scope).await.unwrap();
    let synthetic: Vec<_> = collection
        .meta()
        .iter()
        .filter(|m| m.source_name == SYNTHETIC_SOURCE)
        .collect();
    assert_eq!(synthetic.len(), 1);
    assert!(synthetic[0].text.starts_with("Q: the sky is blue"));

    // both exchanges landed in history
    let history = engine.history(&scope).load();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[1].role, "assistant");
}

#[tokio::test]
async fn test_answer_respects_save_memory_flag() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, Some(Arc::new(MockGenerator::answering("Azure."))));
    let scope = Scope::user("alice");

    engine
        .index_document(&scope, "doc1", "sky.txt", "", b"The sky is blue.")
        .await
        .unwrap();

    let mut request = engine.request("the sky is blue");
    request.save_memory = false;
    let response = engine.answer(&scope, request).await.unwrap();

    assert!(!response.memory_saved);
    assert_eq!(engine.status(&scope).await.unwrap(), 1);
}

#[tokio::test]
async fn test_query_against_empty_scope_is_not_found() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, Some(Arc::new(MockGenerator::answering("x"))));
    let scope = Scope::user("nobody");

    let result = engine.search(&scope, "anything", 5, None).await;
    assert!(matches!(
        result,
        Err(MnemoError::CollectionNotFound { .. })
    ));

    let result = engine.answer(&scope, engine.request("anything")).await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_scopes_never_share_results() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);

    let a = Scope::user("alice");
    engine
        .index_document(&a, "doc1", "a.txt", "", b"Rust ships a borrow checker.")
        .await
        .unwrap();

    let b = Scope::user("bob");
    assert!(engine
        .search(&b, "borrow checker", 5, None)
        .await
        .unwrap_err()
        .is_not_found());

    let agent = Scope::agent("alice", "7");
    assert!(engine
        .search(&agent, "borrow checker", 5, None)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_correction_feedback_appends_in_background() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::user("alice");

    engine
        .index_document(&scope, "doc1", "a.txt", "", b"Rust ships a borrow checker.")
        .await
        .unwrap();
    assert_eq!(engine.status(&scope).await.unwrap(), 1);

    let outcome = engine
        .feedback(
            &scope,
            Feedback {
                query: "what powers the sun".to_string(),
                correct: false,
                answer: None,
                better_answer: Some("nuclear fusion".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, FeedbackOutcome::RetrainScheduled);

    // the append happens on a detached task after feedback() returns
    assert_eq!(wait_for_count(&engine, &scope, 2).await, 2);

    let collection = engine.store().load(&scope).await.unwrap();
    let correction = collection
        .meta()
        .iter()
        .find(|m| m.source_name == FEEDBACK_SOURCE)
        .expect("correction chunk present");
    assert_eq!(correction.text, "Q: what powers the sun\nA: nuclear fusion");
}

#[tokio::test]
async fn test_reinforcement_is_immediate_and_deduped() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::user("alice");

    let feedback = Feedback {
        query: "what powers the sun".to_string(),
        correct: true,
        answer: Some("nuclear fusion".to_string()),
        better_answer: None,
    };

    // no polling needed: reinforcement runs inline
    let outcome = engine.feedback(&scope, feedback.clone()).await.unwrap();
    assert_eq!(outcome, FeedbackOutcome::Reinforced { added: true });
    assert_eq!(engine.status(&scope).await.unwrap(), 1);

    let outcome = engine.feedback(&scope, feedback).await.unwrap();
    assert_eq!(outcome, FeedbackOutcome::Reinforced { added: false });
    assert_eq!(engine.status(&scope).await.unwrap(), 1);

    let collection = engine.store().load(&scope).await.unwrap();
    assert_eq!(collection.meta()[0].source_name, REINFORCE_SOURCE);
}

#[tokio::test]
async fn test_empty_feedback_is_ignored() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::user("alice");

    let outcome = engine
        .feedback(
            &scope,
            Feedback {
                query: "anything".to_string(),
                correct: false,
                answer: None,
                better_answer: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, FeedbackOutcome::Ignored);
    assert_eq!(engine.status(&scope).await.unwrap(), 0);
}

#[tokio::test]
async fn test_low_confidence_triggers_background_reindex() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, Some(Arc::new(MockGenerator::answering("no idea"))));
    let scope = Scope::user("alice");

    engine
        .index_document(&scope, "doc1", "a.txt", "", b"Rust ships a borrow checker.")
        .await
        .unwrap();

    // pollute the collection with a chunk the registry knows nothing about;
    // a full reindex from raw documents will drop it
    engine
        .store()
        .append(
            &scope,
            "stray synthetic chunk",
            DocOwner::global("stray"),
            SYNTHETIC_SOURCE,
            &mnemo::chunking::ChunkingSpec::default(),
        )
        .await
        .unwrap();
    assert_eq!(engine.status(&scope).await.unwrap(), 2);

    // completely unrelated query: avg score 0 < 0.55 schedules the reindex
    let mut request = engine.request("zebra xylophone quorum");
    request.save_memory = false;
    let response = engine.answer(&scope, request).await.unwrap();
    assert!(response.avg_score < 0.55);
    assert!(response.retrain_scheduled);

    // the reindexed collection holds exactly the raw document's chunks
    assert_eq!(wait_for_count(&engine, &scope, 1).await, 1);
    let collection = engine.store().load(&scope).await.unwrap();
    assert_eq!(collection.meta()[0].source_name, "a.txt");
    assert_eq!(collection.meta()[0].owner, DocOwner::global("doc1"));
}

#[tokio::test]
async fn test_schedule_retrain_handles_each_trigger() {
    use mnemo::retrain::RetrainTrigger;

    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::user("alice");

    // reinforcement runs inline through the same entry point
    engine
        .schedule_retrain(
            &scope,
            RetrainTrigger::UserReinforcement {
                query: "what powers the sun".to_string(),
                answer: "nuclear fusion".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(engine.status(&scope).await.unwrap(), 1);

    // corrections run on a background task
    engine
        .schedule_retrain(
            &scope,
            RetrainTrigger::UserCorrection {
                query: "who wrote the report".to_string(),
                better_answer: "the maintenance crew".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(wait_for_count(&engine, &scope, 2).await, 2);

    // a low-confidence reindex rebuilds from the (empty) registry and clears
    // the synthetic-only collection
    engine
        .schedule_retrain(&scope, RetrainTrigger::LowConfidence)
        .await
        .unwrap();
    assert_eq!(wait_for_count(&engine, &scope, 0).await, 0);
}

#[tokio::test]
async fn test_generation_failure_surfaces_without_corrupting_state() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, Some(Arc::new(FailingGenerator)));
    let scope = Scope::user("alice");

    engine
        .index_document(&scope, "doc1", "sky.txt", "", b"The sky is blue.")
        .await
        .unwrap();

    let result = engine.answer(&scope, engine.request("the sky is blue")).await;
    assert!(matches!(result, Err(MnemoError::Generation(_))));

    // retrieval state is untouched and still serviceable
    assert_eq!(engine.status(&scope).await.unwrap(), 1);
    let hits = engine.search(&scope, "the sky is blue", 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_answer_without_generator_is_an_error() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::user("alice");

    engine
        .index_document(&scope, "doc1", "sky.txt", "", b"The sky is blue.")
        .await
        .unwrap();

    let result = engine.answer(&scope, engine.request("the sky is blue")).await;
    assert!(matches!(result, Err(MnemoError::Generation(_))));
}

#[tokio::test]
async fn test_owner_filter_restricts_agent_scope_retrieval() {
    let temp = TempDir::new().unwrap();
    let engine = test_engine(&temp, None);
    let scope = Scope::agent("alice", "7");

    engine
        .index_document(&scope, "doc1", "a.txt", "", b"Rust ships a borrow checker.")
        .await
        .unwrap();
    engine
        .index_document(&scope, "doc2", "b.txt", "", b"Gardens need regular watering.")
        .await
        .unwrap();

    // agent-level filter sees both documents
    let hits = engine.search(&scope, "borrow checker", 10, Some("7")).await.unwrap();
    assert_eq!(hits.len(), 2);

    // document-level filter sees exactly one
    let hits = engine
        .search(&scope, "borrow checker", 10, Some("7:doc2"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_name, "b.txt");

    // a foreign filter matches nothing, which is valid
    let hits = engine.search(&scope, "borrow checker", 10, Some("8")).await.unwrap();
    assert!(hits.is_empty());
}
