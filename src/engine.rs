//! Lifecycle controller
//!
//! An [`Engine`] owns the shared state of one monitored feed: the statistics
//! aggregator, the cancellation token observed by every loop, and the
//! readings taken at the start of the current window. It is created either
//! fresh ([`Engine::new`]) or from a snapshot ([`Engine::resume`]), and moves
//! through
//!
//! ```text
//! Ready ──start()──► Running ──stop()──► Stopping ──► Stopped
//!   └──────────────────stop()──────────────┘
//! ```
//!
//! `Stopped` is reached only after the poll scheduler has exited, the action
//! queue has drained, the auxiliary loops have ended and the final snapshot
//! has been written.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use regex::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::action::{ActionCounts, ActionStats, ActionWorker};
use crate::actors::aggregator::StatsAggregator;
use crate::actors::follower::FollowerPoller;
use crate::actors::latency::LatencyReporter;
use crate::actors::messages::{PollOutcome, PollerStats};
use crate::actors::poller::{PollScheduler, PollerHandle, Trigger};
use crate::actors::summary::{SummarySchedule, SummaryScheduler};
use crate::config::{Config, MonitorConfig};
use crate::feed::FeedClient;
use crate::hook::SummaryHook;
use crate::notify::{Notifier, notify_detached};
use crate::snapshot::{Readings, Snapshot, SnapshotStore, persist_or_dump};
use crate::storage::ItemRecorder;
use crate::util::now_secs;
use crate::{ActorId, FeedIdentity};

/// Collaborators injected into the engine
#[derive(Clone)]
pub struct EngineDeps {
    pub feed: Arc<dyn FeedClient>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub notifier: Arc<dyn Notifier>,
    pub recorder: Arc<dyn ItemRecorder>,
    pub hook: Option<Arc<dyn SummaryHook>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Initialized, loops not spawned yet
    Ready,
    Running,
    Stopping,
    Stopped,
}

/// Point-in-time view of a running engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: Lifecycle,
    pub identity: FeedIdentity,
    pub window_start: i64,
    pub window_total: u64,
    pub poller: Option<PollerStats>,
    pub actions: Option<ActionCounts>,
}

/// Join handles of the spawned loops
struct Tasks {
    poller: JoinHandle<()>,
    worker: Option<JoinHandle<()>>,
    follower: Option<JoinHandle<()>>,
    summary: JoinHandle<()>,
}

impl Tasks {
    /// Wait for every loop, poller first so the action queue closes before
    /// the worker is awaited
    async fn join(self) {
        if let Err(e) = self.poller.await {
            error!("poll scheduler task failed: {e}");
        }
        if let Some(worker) = self.worker {
            if let Err(e) = worker.await {
                error!("action worker task failed: {e}");
            }
        }
        if let Some(follower) = self.follower {
            if let Err(e) = follower.await {
                error!("follower poller task failed: {e}");
            }
        }
        if let Err(e) = self.summary.await {
            error!("summary scheduler task failed: {e}");
        }
    }
}

struct EngineInner {
    handle: u64,
    actor: ActorId,
    identity: FeedIdentity,
    name_override: Option<String>,
    monitor: MonitorConfig,
    schedule: SummarySchedule,
    trigger: Option<Regex>,

    deps: EngineDeps,
    aggregator: StatsAggregator,

    /// Readings at the start of the current window; also serializes flushes
    baseline: tokio::sync::Mutex<Readings>,

    cancel: CancellationToken,
    state: watch::Sender<Lifecycle>,
    tasks: Mutex<Option<Tasks>>,
    poller: Mutex<Option<PollerHandle>>,
    actions: Mutex<Option<Arc<ActionStats>>>,
}

/// Cheap-to-clone handle on one monitored feed
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    /// Authenticate, resolve the feed and take the window's start readings
    ///
    /// Any failure here is fatal: the engine never starts.
    #[instrument(skip_all, fields(handle = config.feed.handle))]
    pub async fn new(config: &Config, deps: EngineDeps) -> anyhow::Result<Self> {
        let account = deps
            .feed
            .whoami()
            .await
            .context("authentication check failed")?;
        info!("authenticated as {account}");

        let container = deps
            .feed
            .fetch_container_meta(config.feed.handle)
            .await
            .context("failed to resolve feed container")?;
        let actor = deps
            .feed
            .fetch_actor_meta(config.feed.actor)
            .await
            .context("failed to fetch monitored actor")?;
        let followers = if config.monitor.followers {
            match deps.feed.fetch_actor_stat(config.feed.actor).await {
                Ok(followers) => Some(followers),
                Err(e) => {
                    warn!("failed to fetch initial follower count: {e}");
                    None
                }
            }
        } else {
            None
        };

        let start = Readings {
            container_name: config
                .feed
                .name
                .clone()
                .unwrap_or_else(|| container.name.clone()),
            counts: container.counts,
            actor,
            followers,
        };

        info!(
            "monitoring {} ({}) for {}",
            start.container_name,
            container.identity,
            config.feed.alias.as_deref().unwrap_or(&start.actor.name)
        );

        Self::assemble(
            config,
            deps,
            container.identity,
            StatsAggregator::new(now_secs()),
            start,
        )
    }

    /// Rebuild an engine from a snapshot written by a previous run
    ///
    /// The window continues with the snapshot's counters and start time. The
    /// feed identity is re-validated when configured; a mismatch switches to
    /// the freshly resolved identity, a failed lookup keeps the stored one.
    #[instrument(skip_all, fields(snapshot = %path.display()))]
    pub async fn resume(config: &Config, deps: EngineDeps, path: &Path) -> anyhow::Result<Self> {
        let snapshot = deps
            .snapshots
            .read(path)
            .await
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;

        if snapshot.feed.handle != config.feed.handle {
            bail!(
                "snapshot belongs to feed {} but the configuration monitors {}",
                snapshot.feed.handle,
                config.feed.handle
            );
        }
        if snapshot.actor.actor_id != config.feed.actor {
            bail!(
                "snapshot tracks actor {} but the configuration monitors {}",
                snapshot.actor.actor_id,
                config.feed.actor
            );
        }

        let account = deps
            .feed
            .whoami()
            .await
            .context("authentication check failed")?;
        info!("authenticated as {account}");

        let mut identity = snapshot.identity();
        if config.monitor.revalidate_on_resume {
            match deps.feed.fetch_container_meta(config.feed.handle).await {
                Ok(meta) if meta.identity != identity => {
                    warn!(
                        "feed identity changed from {identity} to {}, using the new one",
                        meta.identity
                    );
                    identity = meta.identity;
                }
                Ok(_) => debug!("feed identity {identity} confirmed"),
                Err(e) => warn!("could not revalidate feed identity, keeping {identity}: {e}"),
            }
        }

        let counters = snapshot.counters();
        info!(
            "resuming window started at {} with {} items",
            counters.window_start, counters.total
        );

        Self::assemble(
            config,
            deps,
            identity,
            StatsAggregator::from_counters(counters),
            snapshot.start_readings(),
        )
    }

    fn assemble(
        config: &Config,
        deps: EngineDeps,
        identity: FeedIdentity,
        aggregator: StatsAggregator,
        start: Readings,
    ) -> anyhow::Result<Self> {
        let trigger = config.monitor.trigger_regex()?;
        let (state, _) = watch::channel(Lifecycle::Ready);

        Ok(Self {
            inner: Arc::new(EngineInner {
                handle: config.feed.handle,
                actor: config.feed.actor,
                identity,
                name_override: config.feed.name.clone(),
                monitor: config.monitor.clone(),
                schedule: SummarySchedule::from_config(&config.summary),
                trigger,
                deps,
                aggregator,
                baseline: tokio::sync::Mutex::new(start),
                cancel: CancellationToken::new(),
                state,
                tasks: Mutex::new(None),
                poller: Mutex::new(None),
                actions: Mutex::new(None),
            }),
        })
    }

    /// Spawn every loop; returns `false` if the engine was already started or stopped
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let started = inner.state.send_if_modified(|state| {
            if *state == Lifecycle::Ready {
                *state = Lifecycle::Running;
                true
            } else {
                false
            }
        });
        if !started {
            warn!("engine is {:?}, not starting again", self.state());
            return false;
        }

        let monitor = &inner.monitor;
        let feed = &inner.deps.feed;

        let (poller, poller_handle) = PollScheduler::new(
            Arc::clone(feed),
            inner.identity,
            inner.aggregator.clone(),
            inner.cancel.clone(),
            monitor.poll_period(),
        );
        let mut poller = poller.with_recorder(Arc::clone(&inner.deps.recorder));

        if let Some(pattern) = &inner.trigger {
            poller = poller.with_trigger(Trigger {
                pattern: pattern.clone(),
                reporter: LatencyReporter::new(monitor.latency_offset, monitor.latency_cooldown),
                reply: monitor.reply_on_trigger,
            });
        }

        let worker = if monitor.action {
            let (actions, task) = ActionWorker::spawn(
                Arc::clone(feed),
                Arc::clone(&inner.deps.notifier),
                monitor.queue_capacity,
                monitor.pacing(),
            );
            *lock(&inner.actions) = Some(actions.stats());
            poller = poller.with_actions(actions);
            Some(task)
        } else {
            None
        };

        let follower = monitor.followers.then(|| {
            FollowerPoller::new(
                Arc::clone(feed),
                inner.actor,
                inner.aggregator.clone(),
                inner.cancel.clone(),
                monitor.follower_period(),
            )
            .spawn()
        });

        let engine = self.clone();
        let summary = SummaryScheduler::new(inner.schedule, inner.cancel.clone()).spawn(move || {
            let engine = engine.clone();
            async move {
                engine.flush().await;
            }
        });

        *lock(&inner.poller) = Some(poller_handle);
        *lock(&inner.tasks) = Some(Tasks {
            poller: poller.spawn(),
            worker,
            follower,
            summary,
        });

        info!("engine running");
        true
    }

    /// Stop every loop, write the final snapshot and reach `Stopped`
    ///
    /// Safe to call repeatedly and concurrently; later callers wait until the
    /// first one has finished.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let inner = &self.inner;
        let stopping = inner.state.send_if_modified(|state| match *state {
            Lifecycle::Ready | Lifecycle::Running => {
                *state = Lifecycle::Stopping;
                true
            }
            Lifecycle::Stopping | Lifecycle::Stopped => false,
        });
        if !stopping {
            debug!("stop already in progress");
            self.stopped().await;
            return;
        }

        info!("stopping engine");
        inner.cancel.cancel();

        let tasks = lock(&inner.tasks).take();
        if let Some(tasks) = tasks {
            tasks.join().await;
        }
        lock(&inner.poller).take();

        match self.summarize().await {
            Some(path) => info!("final snapshot written to {}", path.display()),
            None => warn!("final snapshot could not be persisted"),
        }

        inner.state.send_replace(Lifecycle::Stopped);
        info!("engine stopped");
    }

    /// Wait until the engine reaches `Stopped`
    pub async fn stopped(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| *state == Lifecycle::Stopped).await;
    }

    pub fn state(&self) -> Lifecycle {
        *self.inner.state.borrow()
    }

    pub fn identity(&self) -> FeedIdentity {
        self.inner.identity
    }

    pub fn aggregator(&self) -> &StatsAggregator {
        &self.inner.aggregator
    }

    /// Run one poll cycle now; `None` unless the engine is running
    pub async fn poll_now(&self) -> Option<PollOutcome> {
        let poller = lock(&self.inner.poller).clone()?;
        poller.poll_now().await
    }

    pub async fn status(&self) -> EngineStatus {
        let poller = lock(&self.inner.poller).clone();
        let poller = match poller {
            Some(poller) => poller.get_stats().await,
            None => None,
        };
        let counters = self.inner.aggregator.current();

        EngineStatus {
            state: self.state(),
            identity: self.inner.identity,
            window_start: counters.window_start,
            window_total: counters.total,
            poller,
            actions: lock(&self.inner.actions).as_ref().map(|stats| stats.counts()),
        }
    }

    /// Flush the current window to the snapshot store
    ///
    /// Takes the end-of-window readings, atomically copies and resets the
    /// aggregator, and persists the result. Returns the written path, or
    /// `None` if the snapshot only reached the stdout fallback. The window is
    /// reset either way.
    #[instrument(skip(self))]
    pub async fn summarize(&self) -> Option<PathBuf> {
        let inner = &self.inner;
        let mut baseline = inner.baseline.lock().await;

        let end = self.read_boundary(&baseline).await;
        let window_end = now_secs();
        let counters = inner.aggregator.snapshot(window_end);

        let snapshot = Snapshot::new(
            inner.handle,
            inner.identity,
            inner.actor,
            counters,
            window_end,
            &baseline,
            &end,
        );
        info!(
            "window {}..{} closed with {} items",
            snapshot.feed.window_start, window_end, snapshot.feed.total_count
        );

        let path = persist_or_dump(&*inner.deps.snapshots, &snapshot).await;
        if path.is_none() {
            notify_detached(
                &inner.deps.notifier,
                format!(
                    "failed to persist snapshot for window ending at {window_end}, dumped to stdout"
                ),
            );
        }

        *baseline = end;
        path
    }

    /// Summarize, then hand the written snapshot to the hook
    pub async fn flush(&self) -> Option<PathBuf> {
        let path = self.summarize().await?;
        if let Some(hook) = &self.inner.deps.hook {
            hook.on_summary(&path).await;
        }
        Some(path)
    }

    /// Fetch the readings for a window boundary, falling back per field
    async fn read_boundary(&self, fallback: &Readings) -> Readings {
        let inner = &self.inner;
        let feed = &inner.deps.feed;
        let mut failures = Vec::new();

        let (container_name, counts) = match feed.fetch_container_meta(inner.handle).await {
            Ok(meta) => (
                inner.name_override.clone().unwrap_or(meta.name),
                meta.counts,
            ),
            Err(e) => {
                failures.push(format!("container metadata: {e}"));
                (fallback.container_name.clone(), fallback.counts)
            }
        };

        let actor = match feed.fetch_actor_meta(inner.actor).await {
            Ok(actor) => actor,
            Err(e) => {
                failures.push(format!("actor metadata: {e}"));
                fallback.actor.clone()
            }
        };

        let followers = if inner.monitor.followers {
            match feed.fetch_actor_stat(inner.actor).await {
                Ok(followers) => Some(followers),
                Err(e) => {
                    failures.push(format!("follower count: {e}"));
                    fallback.followers
                }
            }
        } else {
            None
        };

        if !failures.is_empty() {
            let message = format!("summary readings incomplete: {}", failures.join("; "));
            warn!("{message}");
            notify_detached(&inner.deps.notifier, message);
        }

        Readings {
            container_name,
            counts,
            actor,
            followers,
        }
    }
}
