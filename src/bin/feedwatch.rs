use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use feedwatch::{
    actors::storage::StorageHandle,
    config::{Config, StorageConfig, read_config_file},
    engine::{Engine, EngineDeps},
    feed::bilibili::BiliClient,
    hook::{CommandHook, SummaryHook},
    notify::WebhookNotifier,
    snapshot::FileSnapshotStore,
    storage::{ItemStore, MemoryItemStore},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::spawn;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Snapshot file to resume the window from
    #[arg(short, long)]
    resume: Option<PathBuf>,
}

fn init(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let filter = filter::Targets::new().with_targets(vec![("feedwatch", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = read_config_file(&args.file)?;
    init(&config.log.level);
    trace!("started with args: {args:?}");

    let storage = StorageHandle::spawn(item_store(&config).await?);
    let deps = build_deps(&config, storage.clone())?;

    let engine = match &args.resume {
        Some(path) => Engine::resume(&config, deps, path).await?,
        None => Engine::new(&config, deps).await?,
    };
    engine.start();

    spawn(shutdown_on_ctrl_c(engine.clone()));
    spawn(operator_console(engine.clone()));

    engine.stopped().await;
    storage.shutdown().await;
    info!("bye");

    Ok(())
}

async fn item_store(config: &Config) -> anyhow::Result<Arc<dyn ItemStore>> {
    match config.storage.clone().unwrap_or_default() {
        StorageConfig::None => Ok(Arc::new(MemoryItemStore::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = feedwatch::storage::sqlite::SqliteItemStore::new(&path)
                .await
                .with_context(|| format!("failed to open item database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("built without sqlite support, keeping items in memory");
            Ok(Arc::new(MemoryItemStore::new()))
        }
    }
}

fn build_deps(config: &Config, storage: StorageHandle) -> anyhow::Result<EngineDeps> {
    let credentials = config.credentials.clone().with_env_overrides();
    let feed = BiliClient::new(&config.client, &credentials)
        .context("failed to build the feed client")?;

    let source = config
        .feed
        .name
        .clone()
        .unwrap_or_else(|| config.feed.handle.to_string());

    let hook = config
        .summary
        .hook
        .as_deref()
        .and_then(CommandHook::from_argv)
        .map(|hook| Arc::new(hook) as Arc<dyn SummaryHook>);

    Ok(EngineDeps {
        feed: Arc::new(feed),
        snapshots: Arc::new(FileSnapshotStore::new(config.summary.dir.clone())),
        notifier: WebhookNotifier::from_config(config.alert.clone(), source),
        recorder: Arc::new(storage),
        hook,
    })
}

async fn shutdown_on_ctrl_c(engine: Engine) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received, stopping");
            engine.stop().await;
        }
        Err(e) => error!("failed to listen for interrupt: {e}"),
    }
}

/// Line-based operator commands on stdin
async fn operator_console(engine: Engine) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed, operator console exits");
                return;
            }
            Err(e) => {
                error!("failed to read operator input: {e}");
                return;
            }
        };

        match line.trim() {
            "" => {}
            "exit" | "quit" => {
                engine.stop().await;
                return;
            }
            "summary" => match engine.flush().await {
                Some(path) => info!("summary written to {}", path.display()),
                None => warn!("summary could not be persisted"),
            },
            "status" => {
                let status = engine.status().await;
                info!("{status:?}");
            }
            other => warn!("unknown command '{other}', expected exit, quit, summary or status"),
        }
    }
}
