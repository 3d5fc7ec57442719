//! ItemStorageActor - Persists observed items
//!
//! ## Architecture
//!
//! The poll scheduler hands every new item to a [`StorageHandle`] through the
//! [`ItemRecorder`] trait. The handle converts it to an [`ItemRow`] and
//! `try_send`s it to the actor, so recording never waits on the database. If
//! the actor's inbox is full the row is dropped and counted.
//!
//! ## Batching Strategy
//!
//! Rows are batched before they reach the backend:
//! - **Size trigger**: Flush after 100 rows
//! - **Time trigger**: Flush every 5 seconds
//!
//! A failed batch insert is logged and the rows are lost. The monitor keeps
//! running either way.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{StorageCommand, StorageStats};
use crate::Item;
use crate::storage::{ItemRecorder, ItemRow, ItemStore};

/// Batch size trigger - flush after this many rows
const BATCH_SIZE_TRIGGER: usize = 100;

/// Batch time trigger - flush after this duration
const BATCH_TIME_TRIGGER: Duration = Duration::from_secs(5);

/// Rows the inbox holds before new ones are dropped
const INBOX_CAPACITY: usize = 1024;

/// Storage actor batching rows into an [`ItemStore`]
pub struct ItemStorageActor {
    backend: Arc<dyn ItemStore>,

    /// Rows waiting to be flushed
    batch_buffer: Vec<ItemRow>,

    row_rx: mpsc::Receiver<ItemRow>,

    command_rx: mpsc::Receiver<StorageCommand>,

    flush_interval: Duration,

    flush_count: u64,
    rows_written: u64,
    rows_failed: u64,
    rows_dropped: Arc<AtomicU64>,
}

impl ItemStorageActor {
    pub fn new(
        backend: Arc<dyn ItemStore>,
        row_rx: mpsc::Receiver<ItemRow>,
        command_rx: mpsc::Receiver<StorageCommand>,
        rows_dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            backend,
            batch_buffer: Vec::with_capacity(BATCH_SIZE_TRIGGER),
            row_rx,
            command_rx,
            flush_interval: BATCH_TIME_TRIGGER,
            flush_count: 0,
            rows_written: 0,
            rows_failed: 0,
            rows_dropped,
        }
    }

    /// Override the time-based flush trigger
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting item storage actor");

        let mut flush_interval = time::interval(self.flush_interval);
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                row = self.row_rx.recv() => match row {
                    Some(row) => self.store_row(row).await,
                    None => {
                        debug!("all storage handles dropped, shutting down");
                        break;
                    }
                },

                _ = flush_interval.tick() => {
                    if !self.batch_buffer.is_empty() {
                        trace!("time-based flush triggered ({} rows)", self.batch_buffer.len());
                        self.flush_batch().await;
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    if let Some(ack) = self.handle_command(cmd).await {
                        shutdown_ack = Some(ack);
                        break;
                    }
                }
            }
        }

        // rows already accepted into the inbox are still persisted
        while let Ok(row) = self.row_rx.try_recv() {
            self.batch_buffer.push(row);
        }

        if !self.batch_buffer.is_empty() {
            debug!(
                "final flush before shutdown ({} rows)",
                self.batch_buffer.len()
            );
            self.flush_batch().await;
        }

        debug!("closing backend");
        if let Err(e) = self.backend.close().await {
            error!("error closing backend: {}", e);
        }

        debug!("item storage actor stopped");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn store_row(&mut self, row: ItemRow) {
        trace!("buffering item {} from {}", row.item_id, row.actor_id);
        self.batch_buffer.push(row);

        if self.batch_buffer.len() >= BATCH_SIZE_TRIGGER {
            trace!(
                "size-based flush triggered ({} rows)",
                self.batch_buffer.len()
            );
            self.flush_batch().await;
        }
    }

    async fn flush_batch(&mut self) {
        if self.batch_buffer.is_empty() {
            return;
        }

        let batch: Vec<ItemRow> = self.batch_buffer.drain(..).collect();
        let batch_size = batch.len() as u64;
        debug!("flushing {} rows to backend", batch_size);

        match self.backend.insert_batch(batch).await {
            Ok(()) => {
                self.flush_count += 1;
                self.rows_written += batch_size;
                trace!("flush #{} complete ({} rows)", self.flush_count, batch_size);
            }
            Err(e) => {
                self.rows_failed += batch_size;
                error!("failed to flush batch of {} rows: {}", batch_size, e);
            }
        }
    }

    /// Handle a command, returning the acknowledgement channel on shutdown
    async fn handle_command(&mut self, cmd: StorageCommand) -> Option<oneshot::Sender<()>> {
        match cmd {
            StorageCommand::Flush { respond_to } => {
                debug!("manual flush requested");
                while let Ok(row) = self.row_rx.try_recv() {
                    self.batch_buffer.push(row);
                }
                self.flush_batch().await;
                let _ = respond_to.send(Ok(()));
                None
            }

            StorageCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats());
                None
            }

            StorageCommand::Shutdown { respond_to } => {
                debug!("shutdown requested");
                Some(respond_to)
            }
        }
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            rows_written: self.rows_written,
            buffer_size: self.batch_buffer.len(),
            flush_count: self.flush_count,
            rows_failed: self.rows_failed,
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Handle for controlling the ItemStorageActor
#[derive(Clone)]
pub struct StorageHandle {
    row_tx: mpsc::Sender<ItemRow>,
    sender: mpsc::Sender<StorageCommand>,
    rows_dropped: Arc<AtomicU64>,
}

impl StorageHandle {
    /// Spawn a new storage actor over `backend`
    pub fn spawn(backend: Arc<dyn ItemStore>) -> Self {
        Self::spawn_with_interval(backend, BATCH_TIME_TRIGGER)
    }

    /// Spawn with a custom time-based flush trigger
    pub fn spawn_with_interval(backend: Arc<dyn ItemStore>, flush_interval: Duration) -> Self {
        let (row_tx, row_rx) = mpsc::channel(INBOX_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let rows_dropped = Arc::new(AtomicU64::new(0));

        let actor = ItemStorageActor::new(backend, row_rx, cmd_rx, Arc::clone(&rows_dropped))
            .with_flush_interval(flush_interval);

        tokio::spawn(actor.run());

        Self {
            row_tx,
            sender: cmd_tx,
            rows_dropped,
        }
    }

    /// Flush the write buffer
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::Flush { respond_to: tx })
            .await?;

        rx.await??;
        Ok(())
    }

    /// Get storage statistics
    pub async fn get_stats(&self) -> Option<StorageStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Flush remaining rows, close the backend and wait for the actor to stop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(StorageCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl ItemRecorder for StorageHandle {
    fn record_item(&self, item: &Item, observed_at: i64) {
        let row = ItemRow::from_item(item, observed_at);
        if let Err(e) = self.row_tx.try_send(row) {
            self.rows_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("storage inbox unavailable, item {} not recorded: {e}", item.id);
        }
    }
}
