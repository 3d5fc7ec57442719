//! In-memory item store (no persistence)
//!
//! Useful for tests and for running without a database. All data is lost on
//! restart.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::ItemStore;
use super::error::StorageResult;
use super::schema::ItemRow;
use crate::FeedIdentity;

#[derive(Default)]
struct Inner {
    rows: Vec<ItemRow>,
    keys: HashSet<(u64, i32, u64)>,
}

/// In-memory item store
#[derive(Default)]
pub struct MemoryItemStore {
    inner: RwLock<Inner>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored rows in insertion order
    pub async fn rows(&self) -> Vec<ItemRow> {
        self.inner.read().await.rows.clone()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert_batch(&self, rows: Vec<ItemRow>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        for row in rows {
            let key = (row.container_id, row.container_kind, row.item_id);
            if inner.keys.insert(key) {
                inner.rows.push(row);
            }
        }
        debug!("in-memory store holds {} items", inner.rows.len());
        Ok(())
    }

    async fn count(&self, feed: &FeedIdentity) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .filter(|r| r.container_id == feed.container_id && r.container_kind == feed.container_kind)
            .count() as u64)
    }

    async fn query_since(&self, feed: &FeedIdentity, since: i64) -> StorageResult<Vec<ItemRow>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ItemRow> = inner
            .rows
            .iter()
            .filter(|r| {
                r.container_id == feed.container_id
                    && r.container_kind == feed.container_kind
                    && r.observed_at >= since
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.observed_at, r.item_id));
        Ok(rows)
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
