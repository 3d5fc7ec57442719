//! Item store trait definitions

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::ItemRow;
use crate::{FeedIdentity, Item};

/// Fire-and-forget sink for observed items
///
/// Called from the poll scheduler's ingestion path for every new item.
/// Implementations must return immediately and swallow their own failures.
pub trait ItemRecorder: Send + Sync {
    fn record_item(&self, item: &Item, observed_at: i64);
}

/// Recorder that discards everything
#[derive(Debug, Clone, Default)]
pub struct NullRecorder;

impl ItemRecorder for NullRecorder {
    fn record_item(&self, _item: &Item, _observed_at: i64) {}
}

/// Trait for persistent item storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are driven from the
/// storage actor's task.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert a batch of rows
    ///
    /// Rows already present (same container and item id) are ignored.
    async fn insert_batch(&self, rows: Vec<ItemRow>) -> StorageResult<()>;

    /// Number of rows stored for a container
    async fn count(&self, feed: &FeedIdentity) -> StorageResult<u64>;

    /// Rows of a container with `observed_at >= since`, oldest first
    async fn query_since(&self, feed: &FeedIdentity, since: i64) -> StorageResult<Vec<ItemRow>>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
