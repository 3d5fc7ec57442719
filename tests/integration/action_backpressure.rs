//! Backpressure and draining behaviour of the action queue

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use feedwatch::ItemId;
use feedwatch::actors::action::ActionCounts;
use feedwatch::engine::Engine;
use feedwatch::util::now_secs;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_overflow_is_dropped_not_queued() {
    let feed = ScriptedFeed::new();
    *feed.action_delay.lock().unwrap() = Duration::from_millis(20);
    let now = now_secs();

    feed.push_fetch(vec![]);
    feed.push_fetch((1..=5).map(|id| item(id, id, now, "")).collect());

    let engine = Engine::new(
        &test_config(r#""queue_capacity": 2"#),
        deps(feed.clone(), MemorySnapshotStore::new(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();

    let status = engine.status().await;
    let actions = status.actions.unwrap();
    assert_eq!(actions.accepted, 2);
    assert_eq!(actions.dropped, 3);

    // every item still reaches the statistics
    assert_eq!(engine.aggregator().total(), 5);

    engine.stop().await;
    assert_eq!(feed.actions(), vec![ItemId(1), ItemId(2)]);
}

#[tokio::test]
async fn test_stop_drains_accepted_items() {
    let feed = ScriptedFeed::new();
    *feed.action_delay.lock().unwrap() = Duration::from_millis(30);
    let now = now_secs();

    feed.push_fetch(vec![]);
    feed.push_fetch((1..=4).map(|id| item(id, 1, now, "")).collect());

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), MemorySnapshotStore::new(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();

    // stop right away: nothing accepted may be abandoned
    engine.stop().await;
    assert_eq!(feed.actions().len(), 4);
}

#[tokio::test]
async fn test_failed_actions_do_not_stall_queue() {
    let feed = ScriptedFeed::new();
    feed.fail_actions.store(true, Ordering::SeqCst);
    let notifier = Arc::new(RecordingNotifier::default());
    let now = now_secs();

    feed.push_fetch(vec![]);
    feed.push_fetch((1..=3).map(|id| item(id, 1, now, "")).collect());

    let engine = Engine::new(
        &test_config(""),
        deps(feed.clone(), MemorySnapshotStore::new(), notifier.clone()),
    )
    .await
    .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();
    engine.stop().await;

    assert_eq!(feed.actions(), vec![ItemId(1), ItemId(2), ItemId(3)]);
    let counts = engine.status().await.actions.unwrap();
    assert_eq!(
        counts,
        ActionCounts {
            accepted: 3,
            dropped: 0,
            succeeded: 0,
            failed: 3,
        }
    );

    eventually(|| {
        notifier
            .messages()
            .iter()
            .filter(|m| m.starts_with("action on item"))
            .count()
            == 3
    })
    .await;
}

#[tokio::test]
async fn test_disabled_actions_spawn_no_worker() {
    let feed = ScriptedFeed::new();
    let now = now_secs();
    feed.push_fetch(vec![]);
    feed.push_fetch(vec![item(1, 1, now, "")]);

    let engine = Engine::new(
        &test_config(r#""action": false"#),
        deps(feed.clone(), MemorySnapshotStore::new(), Arc::default()),
    )
    .await
    .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();

    assert_eq!(engine.status().await.actions, None);
    engine.stop().await;
    assert!(feed.actions().is_empty());
}
