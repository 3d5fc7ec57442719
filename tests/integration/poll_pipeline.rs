//! End-to-end tests of the poll → ingest → action pipeline

use std::sync::Arc;

use feedwatch::ItemId;
use feedwatch::actors::messages::PollOutcome;
use feedwatch::actors::storage::StorageHandle;
use feedwatch::engine::{Engine, Lifecycle};
use feedwatch::storage::{ItemStore, MemoryItemStore};
use feedwatch::util::now_secs;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_new_items_processed_in_fetch_order() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();
    let now = now_secs();

    let (a, b, c) = (
        item(1, 10, now - 3, "first"),
        item(2, 11, now - 2, "second"),
        item(3, 10, now - 1, "third"),
    );
    feed.push_fetch(vec![b.clone()]);
    feed.push_fetch(vec![a, b, c]);

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
    )
    .await
    .unwrap();
    assert!(engine.start());
    assert_eq!(engine.state(), Lifecycle::Running);

    let outcome = engine.poll_now().await.unwrap();
    assert_eq!(outcome, PollOutcome::Processed { fresh: 2, window: 3 });

    eventually(|| feed.actions().len() == 2).await;
    assert_eq!(feed.actions(), vec![ItemId(1), ItemId(3)]);

    engine.stop().await;

    let written = store.written();
    assert_eq!(written.len(), 1);
    let snapshot = &written[0];
    assert_eq!(snapshot.feed.total_count, 2);
    assert_eq!(snapshot.feed.contributors.get(&feedwatch::ActorId(10)), Some(&2));
    assert_eq!(snapshot.feed.name, "evening stream");
    assert_eq!(snapshot.actor.start.name, "bobo");
}

#[tokio::test]
async fn test_pre_existing_items_are_never_processed() {
    let feed = ScriptedFeed::new();
    let now = now_secs();
    feed.push_fetch(vec![item(1, 1, now - 60, "old"), item(2, 2, now - 50, "old")]);

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), MemorySnapshotStore::new(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();

    // steady state: the scripted feed repeats the seeded list
    let outcome = engine.poll_now().await.unwrap();
    assert_eq!(outcome, PollOutcome::Processed { fresh: 0, window: 2 });
    assert_eq!(engine.aggregator().total(), 0);

    engine.stop().await;
    assert!(feed.actions().is_empty());
}

#[tokio::test]
async fn test_trigger_reply_posted_once_per_cooldown() {
    let feed = ScriptedFeed::new();
    let now = now_secs();
    feed.push_fetch(vec![]);
    feed.push_fetch(vec![
        item(1, 1, now - 40, "delay?"),
        item(2, 2, now - 30, "delay??"),
    ]);

    let config = test_config(r#""trigger": "delay", "reply_on_trigger": true, "action": false"#);
    let engine = Engine::new(&config, deps(feed.clone(), MemorySnapshotStore::new(), Arc::default()))
        .await
        .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();
    engine.stop().await;

    let replies = feed.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, ItemId(1));
    assert!(replies[0].1.starts_with("current delay: "));
    assert!(feed.actions().is_empty());
}

#[tokio::test]
async fn test_observed_items_reach_item_store() {
    let feed = ScriptedFeed::new();
    let now = now_secs();
    feed.push_fetch(vec![]);
    feed.push_fetch(vec![item(5, 1, now, "a"), item(6, 2, now, "b")]);

    let items = Arc::new(MemoryItemStore::new());
    let storage = StorageHandle::spawn(items.clone());

    let mut engine_deps = deps(feed.clone(), MemorySnapshotStore::new(), Arc::default());
    engine_deps.recorder = Arc::new(storage.clone());

    let engine = Engine::new(&test_config(r#""action": false"#), engine_deps)
        .await
        .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();
    engine.stop().await;
    storage.shutdown().await;

    assert_eq!(items.count(&IDENTITY).await.unwrap(), 2);
    let rows = items.query_since(&IDENTITY, 0).await.unwrap();
    assert_eq!(
        rows.iter().map(|r| r.item_id).collect::<Vec<_>>(),
        vec![5, 6]
    );
}
