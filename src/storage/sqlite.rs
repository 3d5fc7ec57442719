//! SQLite item store
//!
//! - **Embedded**: no separate database server required
//! - **WAL mode**: readers are not blocked by the batch writer
//! - **Migrations**: schema versioning with sqlx
//!
//! Item ids are stored as SQLite integers; values above `i64::MAX` wrap, which
//! the remote id space never reaches.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::ItemStore;
use super::error::{StorageError, StorageResult};
use super::schema::ItemRow;
use crate::FeedIdentity;

/// SQLite-backed item store
pub struct SqliteItemStore {
    pool: Pool<Sqlite>,
}

impl SqliteItemStore {
    /// Open (or create) the database and run migrations
    ///
    /// ```no_run
    /// # use feedwatch::storage::sqlite::SqliteItemStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteItemStore::new("./items.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite item store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn row_from_sqlite(row: &sqlx::sqlite::SqliteRow) -> StorageResult<ItemRow> {
        Ok(ItemRow {
            container_id: row.try_get::<i64, _>("container_id")? as u64,
            container_kind: row.try_get::<i64, _>("container_kind")? as i32,
            item_id: row.try_get::<i64, _>("item_id")? as u64,
            actor_id: row.try_get::<i64, _>("actor_id")? as u64,
            actor_name: row.try_get("actor_name")?,
            emitted_at: row.try_get("emitted_at")?,
            observed_at: row.try_get("observed_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_batch(&self, rows: Vec<ItemRow>) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO items (
                    container_id, container_kind, item_id, actor_id,
                    actor_name, emitted_at, observed_at, payload
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (container_id, container_kind, item_id) DO NOTHING
                "#,
            )
            .bind(row.container_id as i64)
            .bind(row.container_kind as i64)
            .bind(row.item_id as i64)
            .bind(row.actor_id as i64)
            .bind(&row.actor_name)
            .bind(row.emitted_at)
            .bind(row.observed_at)
            .bind(&row.payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("batch insert complete");
        Ok(())
    }

    async fn count(&self, feed: &FeedIdentity) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE container_id = ? AND container_kind = ?",
        )
        .bind(feed.container_id as i64)
        .bind(feed.container_kind as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn query_since(&self, feed: &FeedIdentity, since: i64) -> StorageResult<Vec<ItemRow>> {
        let rows = sqlx::query(
            r#"
            SELECT container_id, container_kind, item_id, actor_id,
                   actor_name, emitted_at, observed_at, payload
            FROM items
            WHERE container_id = ? AND container_kind = ? AND observed_at >= ?
            ORDER BY observed_at ASC, item_id ASC
            "#,
        )
        .bind(feed.container_id as i64)
        .bind(feed.container_kind as i64)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_from_sqlite).collect()
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite item store");
        self.pool.close().await;
        Ok(())
    }
}
