//! Snapshots of a measurement window
//!
//! A [`Snapshot`] is written at every flush (scheduled, manual, shutdown) and
//! can be read back to resume the window after a restart. The JSON layout is
//! consumed by external reporting scripts, so field names are stable.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::actors::aggregator::WindowCounters;
use crate::storage::{StorageError, StorageResult};
use crate::{ActorId, ActorMeta, ContainerCounts, FeedIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub feed: FeedSection,
    pub actor: ActorSection,
}

/// Container identity, window bounds and per-window counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSection {
    pub handle: u64,
    pub container_id: u64,
    pub container_kind: i32,
    pub name: String,
    pub window_start: i64,
    pub window_end: i64,
    pub total_count: u64,
    pub counts_per_minute: Vec<u64>,
    pub max_delay_per_minute: Vec<i64>,
    pub contributors: BTreeMap<ActorId, u64>,
    pub start_counts: ContainerCounts,
    pub end_counts: ContainerCounts,
}

/// The monitored actor at window start and end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSection {
    pub actor_id: ActorId,
    pub start: ActorMeta,
    pub end: ActorMeta,
    pub start_followers: Option<u64>,
    pub end_followers: Option<u64>,
    pub follower_series: Vec<u64>,
}

/// Point-in-time metadata captured at a window boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readings {
    pub container_name: String,
    pub counts: ContainerCounts,
    pub actor: ActorMeta,
    pub followers: Option<u64>,
}

impl Snapshot {
    /// Assemble a snapshot from a flushed window and its boundary readings
    pub fn new(
        handle: u64,
        identity: FeedIdentity,
        actor_id: ActorId,
        counters: WindowCounters,
        window_end: i64,
        start: &Readings,
        end: &Readings,
    ) -> Self {
        let WindowCounters {
            window_start,
            total,
            contributors,
            counts_per_minute,
            max_delay_per_minute,
            follower_series,
        } = counters;

        Self {
            feed: FeedSection {
                handle,
                container_id: identity.container_id,
                container_kind: identity.container_kind,
                name: end.container_name.clone(),
                window_start,
                window_end,
                total_count: total,
                counts_per_minute,
                max_delay_per_minute,
                contributors: contributors.into_iter().collect(),
                start_counts: start.counts,
                end_counts: end.counts,
            },
            actor: ActorSection {
                actor_id,
                start: start.actor.clone(),
                end: end.actor.clone(),
                start_followers: start.followers,
                end_followers: end.followers,
                follower_series,
            },
        }
    }

    pub fn identity(&self) -> FeedIdentity {
        FeedIdentity {
            container_id: self.feed.container_id,
            container_kind: self.feed.container_kind,
        }
    }

    /// Aggregator counters captured in this snapshot
    pub fn counters(&self) -> WindowCounters {
        WindowCounters {
            window_start: self.feed.window_start,
            total: self.feed.total_count,
            contributors: self
                .feed
                .contributors
                .iter()
                .map(|(actor, count)| (*actor, *count))
                .collect::<HashMap<_, _>>(),
            counts_per_minute: self.feed.counts_per_minute.clone(),
            max_delay_per_minute: self.feed.max_delay_per_minute.clone(),
            follower_series: self.actor.follower_series.clone(),
        }
    }

    /// Readings at window start
    ///
    /// A resumed engine continues this snapshot's window, so these become its
    /// baseline again.
    pub fn start_readings(&self) -> Readings {
        Readings {
            container_name: self.feed.name.clone(),
            counts: self.feed.start_counts,
            actor: self.actor.start.clone(),
            followers: self.actor.start_followers,
        }
    }
}

/// Persistence for snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, returning where it was written
    async fn write(&self, snapshot: &Snapshot) -> StorageResult<PathBuf>;

    async fn read(&self, path: &Path) -> StorageResult<Snapshot>;
}

/// Writes one pretty-printed JSON file per flush into a directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(window_end: i64) -> String {
        match Local.timestamp_opt(window_end, 0).single() {
            Some(at) => format!("summary-{}", at.format("%Y%m%d-%H%M%S")),
            None => format!("summary-{window_end}"),
        }
    }

    async fn free_path(&self, stem: &str) -> PathBuf {
        let mut candidate = self.dir.join(format!("{stem}.json"));
        let mut suffix = 1;
        while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = self.dir.join(format!("{stem}-{suffix}.json"));
            suffix += 1;
        }
        candidate
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    #[instrument(skip(self, snapshot), fields(dir = %self.dir.display()))]
    async fn write(&self, snapshot: &Snapshot) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let body = serde_json::to_vec_pretty(snapshot)?;
        let path = self
            .free_path(&Self::file_stem(snapshot.feed.window_end))
            .await;
        tokio::fs::write(&path, body).await?;

        debug!("snapshot written to {}", path.display());
        Ok(path)
    }

    async fn read(&self, path: &Path) -> StorageResult<Snapshot> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::snapshot_read(path, e))?;
        serde_json::from_slice(&body).map_err(|e| StorageError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Persist a snapshot, dumping it to stdout when the store fails
///
/// Returns the written path, or `None` if only the stdout dump happened.
pub async fn persist_or_dump(store: &dyn SnapshotStore, snapshot: &Snapshot) -> Option<PathBuf> {
    match store.write(snapshot).await {
        Ok(path) => {
            info!("snapshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("failed to persist snapshot: {e}, dumping to stdout");
            dump(snapshot, &mut std::io::stdout().lock());
            None
        }
    }
}

fn dump(snapshot: &Snapshot, out: &mut impl Write) {
    match serde_json::to_string(snapshot) {
        Ok(json) => {
            if let Err(e) = writeln!(out, "{json}") {
                error!("failed to dump snapshot: {e}");
            }
        }
        Err(e) => error!("failed to serialize snapshot: {e}"),
    }
}
