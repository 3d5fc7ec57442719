//! Lifecycle transitions, final flush and resume from snapshot

use std::sync::Arc;
use std::sync::atomic::Ordering;

use feedwatch::FeedIdentity;
use feedwatch::engine::{Engine, EngineDeps, Lifecycle};
use feedwatch::notify::NoopNotifier;
use feedwatch::snapshot::{FileSnapshotStore, SnapshotStore};
use feedwatch::storage::NullRecorder;
use feedwatch::util::now_secs;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::helpers::*;

#[tokio::test]
async fn test_stop_is_idempotent() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(""),
        deps(feed, store.clone(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();

    tokio::join!(engine.stop(), engine.stop(), engine.stop());
    assert_eq!(engine.state(), Lifecycle::Stopped);

    engine.stop().await;
    engine.stopped().await;

    assert_eq!(store.written().len(), 1);
    assert!(!engine.start());
}

#[tokio::test]
async fn test_stopped_waits_for_final_flush() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(""),
        deps(feed, store.clone(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();

    let waiter = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.stopped().await;
            engine.state()
        })
    };

    engine.stop().await;
    assert_eq!(waiter.await.unwrap(), Lifecycle::Stopped);
    assert_eq!(store.written().len(), 1);
}

#[tokio::test]
async fn test_snapshot_resume_restores_window() {
    let dir = TempDir::new().unwrap();
    let files = Arc::new(FileSnapshotStore::new(dir.path().join("summary")));
    let feed = ScriptedFeed::new();
    let now = now_secs();

    feed.push_fetch(vec![]);
    feed.push_fetch(vec![
        item(1, 7, now, "a"),
        item(2, 7, now, "b"),
        item(3, 8, now, "c"),
    ]);

    let engine_deps = || EngineDeps {
        feed: feed.clone(),
        snapshots: files.clone(),
        notifier: Arc::new(NoopNotifier),
        recorder: Arc::new(NullRecorder),
        hook: None,
    };

    let config = test_config(r#""action": false, "followers": false"#);
    let first = Engine::new(&config, engine_deps()).await.unwrap();
    first.start();
    first.poll_now().await.unwrap();
    let window = first.aggregator().current();

    let path = first.summarize().await.unwrap();
    let written = files.read(&path).await.unwrap();
    assert_eq!(written.counters(), window);

    let resumed = Engine::resume(&config, engine_deps(), &path).await.unwrap();
    assert_eq!(resumed.state(), Lifecycle::Ready);
    assert_eq!(resumed.identity(), IDENTITY);
    assert_eq!(resumed.aggregator().current(), written.counters());
    assert_eq!(resumed.aggregator().window_start(), window.window_start);

    first.stop().await;
    resumed.stop().await;
}

#[tokio::test]
async fn test_resume_switches_to_revalidated_identity() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
    )
    .await
    .unwrap();
    let path = engine.summarize().await.unwrap();

    let moved = FeedIdentity {
        container_id: 4_242,
        container_kind: 11,
    };
    feed.set_identity(moved);

    let resumed = Engine::resume(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
        &path,
    )
    .await
    .unwrap();
    assert_eq!(resumed.identity(), moved);

    // a failed lookup keeps the stored identity
    feed.fail_meta.store(true, Ordering::SeqCst);
    let kept = Engine::resume(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
        &path,
    )
    .await
    .unwrap();
    assert_eq!(kept.identity(), IDENTITY);

    // revalidation disabled: stored identity is trusted
    feed.fail_meta.store(false, Ordering::SeqCst);
    let trusted = Engine::resume(
        &test_config(r#""revalidate_on_resume": false"#),
        deps(feed, store, Arc::default()),
        &path,
    )
    .await
    .unwrap();
    assert_eq!(trusted.identity(), IDENTITY);
}

#[tokio::test]
async fn test_resume_rejects_foreign_snapshot() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
    )
    .await
    .unwrap();
    let path = engine.summarize().await.unwrap();

    let mut snapshot = store.written()[0].clone();
    snapshot.feed.handle = 1;
    store.insert("foreign.json", snapshot);

    let result = Engine::resume(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
        std::path::Path::new("foreign.json"),
    )
    .await;
    assert!(result.is_err());

    let missing = Engine::resume(
        &test_config(""),
        deps(feed, store, Arc::default()),
        &path.with_file_name("missing.json"),
    )
    .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_consecutive_windows_chain_readings() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), store.clone(), Arc::default()),
    )
    .await
    .unwrap();

    feed.set_followers(1_100);
    engine.summarize().await.unwrap();
    feed.set_followers(1_250);
    engine.summarize().await.unwrap();

    let written = store.written();
    assert_eq!(written[0].actor.start_followers, Some(1_000));
    assert_eq!(written[0].actor.end_followers, Some(1_100));
    assert_eq!(written[1].actor.start_followers, Some(1_100));
    assert_eq!(written[1].actor.end_followers, Some(1_250));
    assert_eq!(written[1].feed.window_start, written[0].feed.window_end);
}
