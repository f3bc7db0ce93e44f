//! Index store integration: persistence round trips and write serialization

mod common;

use common::{MockEmbedder, MOCK_DIMENSION};
use mnemo::chunking::ChunkingSpec;
use mnemo::store::{DocOwner, IndexStore, Scope};
use std::sync::Arc;
use tempfile::TempDir;

fn test_store(temp: &TempDir) -> IndexStore {
    IndexStore::new(temp.path().to_path_buf(), Arc::new(MockEmbedder))
}

#[tokio::test]
async fn test_round_trip_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let scope = Scope::user("alice");

    {
        let store = test_store(&temp);
        store
            .append(
                &scope,
                "The sky is blue today. The grass is green outside.",
                DocOwner::global("doc-1"),
                "weather.txt",
                &ChunkingSpec::default(),
            )
            .await
            .unwrap();
    }

    // a fresh store instance reads the same persisted pair
    let store = test_store(&temp);
    let collection = store.load(&scope).await.unwrap();
    assert!(!collection.is_empty());
    assert_eq!(collection.vectors().nrows(), collection.meta().len());
    assert_eq!(collection.dimension(), MOCK_DIMENSION);
    assert_eq!(collection.meta()[0].source_name, "weather.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_parity() {
    let temp = TempDir::new().unwrap();
    let store = test_store(&temp);
    let scope = Scope::user("alice");

    // hammer one scope from several tasks; per-scope serialization must keep
    // the two halves aligned and sequences strictly increasing
    let mut handles = Vec::new();
    for task in 0..4 {
        let store = store.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                store
                    .append(
                        &scope,
                        &format!("task {task} writes entry number {i} with unique words t{task}e{i}"),
                        DocOwner::global(format!("doc-{task}-{i}")),
                        "load.txt",
                        &ChunkingSpec::default(),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let collection = store.load(&scope).await.unwrap();
    assert_eq!(collection.len(), 20);
    assert_eq!(collection.vectors().nrows(), 20);

    let sequences: Vec<u64> = collection.meta().iter().map(|m| m.sequence).collect();
    for pair in sequences.windows(2) {
        assert!(pair[0] < pair[1], "sequences must be strictly increasing");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_see_consistent_snapshots() {
    let temp = TempDir::new().unwrap();
    let store = test_store(&temp);
    let scope = Scope::user("alice");

    store
        .append(
            &scope,
            "Initial content for snapshot readers.",
            DocOwner::global("doc-0"),
            "init.txt",
            &ChunkingSpec::default(),
        )
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            for i in 0..10 {
                store
                    .append(
                        &scope,
                        &format!("concurrent write number {i}"),
                        DocOwner::global(format!("doc-{i}")),
                        "writes.txt",
                        &ChunkingSpec::default(),
                    )
                    .await
                    .unwrap();
            }
        })
    };

    // every snapshot a reader loads must be internally consistent, whatever
    // the writer is doing
    for _ in 0..20 {
        let collection = store.load(&scope).await.unwrap();
        assert_eq!(collection.vectors().nrows(), collection.meta().len());
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    assert_eq!(store.count(&scope).await.unwrap(), 11);
}
