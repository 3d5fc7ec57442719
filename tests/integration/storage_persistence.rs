//! Item persistence through the storage actor into SQLite

use std::sync::Arc;

use feedwatch::actors::storage::StorageHandle;
use feedwatch::engine::Engine;
use feedwatch::storage::ItemStore;
use feedwatch::storage::sqlite::SqliteItemStore;
use feedwatch::util::now_secs;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::helpers::*;

#[tokio::test]
async fn test_observed_items_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("items.db");
    let feed = ScriptedFeed::new();
    let now = now_secs();

    feed.push_fetch(vec![]);
    feed.push_fetch(vec![item(11, 1, now - 5, "hi"), item(12, 2, now - 4, "hello")]);
    feed.push_fetch(vec![
        item(11, 1, now - 5, "hi"),
        item(12, 2, now - 4, "hello"),
        item(13, 1, now - 1, "again"),
    ]);

    let store = Arc::new(SqliteItemStore::new(&db_path).await.unwrap());
    let storage = StorageHandle::spawn(store);

    let mut engine_deps = deps(feed, MemorySnapshotStore::new(), Arc::default());
    engine_deps.recorder = Arc::new(storage.clone());

    let engine = Engine::new(&test_config(r#""action": false"#), engine_deps)
        .await
        .unwrap();
    engine.start();
    engine.poll_now().await.unwrap();
    engine.poll_now().await.unwrap();
    engine.stop().await;

    let stats = storage.get_stats().await.unwrap();
    assert_eq!(stats.rows_dropped, 0);
    storage.shutdown().await;

    let reopened = SqliteItemStore::new(&db_path).await.unwrap();
    assert_eq!(reopened.count(&IDENTITY).await.unwrap(), 3);

    let rows = reopened.query_since(&IDENTITY, 0).await.unwrap();
    let payloads: Vec<&str> = rows.iter().map(|r| r.payload.as_str()).collect();
    assert_eq!(payloads, vec!["hi", "hello", "again"]);
}
