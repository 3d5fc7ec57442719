//! Helper types for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedwatch::config::{Config, parse_config};
use feedwatch::engine::EngineDeps;
use feedwatch::feed::{FeedClient, FeedError, FeedResult};
use feedwatch::notify::Notifier;
use feedwatch::snapshot::{Snapshot, SnapshotStore};
use feedwatch::storage::{NullRecorder, StorageError, StorageResult};
use feedwatch::{ActorId, ActorMeta, ContainerCounts, ContainerMeta, FeedIdentity, Item, ItemId};

pub const HANDLE: u64 = 662_016_827_293_958_168;
pub const ACTOR: ActorId = ActorId(33_605_910);
pub const IDENTITY: FeedIdentity = FeedIdentity {
    container_id: 9_001,
    container_kind: 17,
};

pub fn item(id: u64, actor: u64, emitted_at: i64, payload: &str) -> Item {
    Item {
        id: ItemId(id),
        actor_id: ActorId(actor),
        actor_name: format!("viewer{actor}"),
        emitted_at,
        payload: payload.to_string(),
        feed: IDENTITY,
    }
}

/// Config with long intervals, so only the first tick and explicit polls run
pub fn test_config(extra_monitor: &str) -> Config {
    let monitor = if extra_monitor.is_empty() {
        r#""poll_interval": 3600, "follower_interval": 3600, "action_pacing": 0"#.to_string()
    } else {
        format!(
            r#""poll_interval": 3600, "follower_interval": 3600, "action_pacing": 0, {extra_monitor}"#
        )
    };
    parse_config(&format!(
        r#"{{
            "feed": {{"handle": {HANDLE}, "actor": {}}},
            "monitor": {{{monitor}}},
            "summary": {{"hour": 3, "minute": 0}}
        }}"#,
        ACTOR.0
    ))
    .unwrap()
}

/// Scripted feed client
///
/// Fetches are served from a queue; once it is empty the last successful
/// list is repeated. Every call is recorded.
pub struct ScriptedFeed {
    fetches: Mutex<VecDeque<FeedResult<Vec<Item>>>>,
    last_fetch: Mutex<Vec<Item>>,
    identity: Mutex<FeedIdentity>,
    pub actions: Mutex<Vec<ItemId>>,
    pub replies: Mutex<Vec<(ItemId, String)>>,
    pub action_delay: Mutex<Duration>,
    pub fail_actions: AtomicBool,
    pub fail_meta: AtomicBool,
    pub fail_auth: AtomicBool,
    pub fetch_calls: AtomicUsize,
    followers: Mutex<u64>,
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self {
            fetches: Mutex::default(),
            last_fetch: Mutex::default(),
            identity: Mutex::new(IDENTITY),
            actions: Mutex::default(),
            replies: Mutex::default(),
            action_delay: Mutex::new(Duration::ZERO),
            fail_actions: AtomicBool::new(false),
            fail_meta: AtomicBool::new(false),
            fail_auth: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            followers: Mutex::new(1_000),
        }
    }
}

impl ScriptedFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_fetch(&self, items: Vec<Item>) {
        self.fetches.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_fetch_error(&self) {
        self.fetches
            .lock()
            .unwrap()
            .push_back(Err(FeedError::Http(502)));
    }

    pub fn set_identity(&self, identity: FeedIdentity) {
        *self.identity.lock().unwrap() = identity;
    }

    pub fn set_followers(&self, followers: u64) {
        *self.followers.lock().unwrap() = followers;
    }

    pub fn actions(&self) -> Vec<ItemId> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedClient for ScriptedFeed {
    async fn whoami(&self) -> FeedResult<String> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(FeedError::Unauthenticated("account not logged in".to_string()));
        }
        Ok("watcher".to_string())
    }

    async fn fetch_items(&self, _feed: &FeedIdentity) -> FeedResult<Vec<Item>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.fetches.lock().unwrap().pop_front();
        match next {
            Some(Ok(items)) => {
                *self.last_fetch.lock().unwrap() = items.clone();
                Ok(items)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_fetch.lock().unwrap().clone()),
        }
    }

    async fn fetch_container_meta(&self, _handle: u64) -> FeedResult<ContainerMeta> {
        if self.fail_meta.load(Ordering::SeqCst) {
            return Err(FeedError::Api {
                code: -404,
                message: "not found".to_string(),
            });
        }
        Ok(ContainerMeta {
            identity: *self.identity.lock().unwrap(),
            name: "evening stream".to_string(),
            counts: ContainerCounts {
                total: 120,
                top_level: 80,
            },
        })
    }

    async fn fetch_actor_meta(&self, _actor: ActorId) -> FeedResult<ActorMeta> {
        if self.fail_meta.load(Ordering::SeqCst) {
            return Err(FeedError::Transport("connection reset".to_string()));
        }
        Ok(ActorMeta {
            name: "bobo".to_string(),
            avatar: "https://i0.example.com/face.jpg".to_string(),
            bio: "hello".to_string(),
        })
    }

    async fn fetch_actor_stat(&self, _actor: ActorId) -> FeedResult<u64> {
        if self.fail_meta.load(Ordering::SeqCst) {
            return Err(FeedError::Http(503));
        }
        Ok(*self.followers.lock().unwrap())
    }

    async fn perform_action(&self, item: &Item) -> FeedResult<bool> {
        let delay = *self.action_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.actions.lock().unwrap().push(item.id);
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(FeedError::Transport("timeout".to_string()));
        }
        Ok(true)
    }

    async fn post_reply(&self, item: &Item, text: &str) -> FeedResult<()> {
        self.replies
            .lock()
            .unwrap()
            .push((item.id, text.to_string()));
        Ok(())
    }
}

/// Snapshot store keeping everything in memory; can be switched to fail
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<PathBuf, Snapshot>>,
    pub written: Mutex<Vec<Snapshot>>,
    pub fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn written(&self) -> Vec<Snapshot> {
        self.written.lock().unwrap().clone()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().insert(path.into(), snapshot);
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, snapshot: &Snapshot) -> StorageResult<PathBuf> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )));
        }
        let mut written = self.written.lock().unwrap();
        written.push(snapshot.clone());
        let path = PathBuf::from(format!("memory/summary-{}.json", written.len()));
        self.snapshots
            .lock()
            .unwrap()
            .insert(path.clone(), snapshot.clone());
        Ok(path)
    }

    async fn read(&self, path: &Path) -> StorageResult<Snapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::SnapshotNotFound(path.to_path_buf()))
    }
}

/// Notifier remembering every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn deps(
    feed: Arc<ScriptedFeed>,
    snapshots: Arc<MemorySnapshotStore>,
    notifier: Arc<RecordingNotifier>,
) -> EngineDeps {
    EngineDeps {
        feed,
        snapshots,
        notifier,
        recorder: Arc::new(NullRecorder),
        hook: None,
    }
}

/// Wait until `condition` holds, failing the test after five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
