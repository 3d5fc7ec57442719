use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::ActorId;

/// Item storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Keep observed items in memory only
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./items.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub feed: FeedConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    /// Item storage configuration (defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub credentials: Credentials,

    pub alert: Option<Alert>,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// What is being watched
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FeedConfig {
    /// Higher-level handle (the post id) the comment container is resolved from
    pub handle: u64,

    /// Display name of the container; the remote name is used when absent
    pub name: Option<String>,

    /// Actor whose follower count is sampled
    pub actor: ActorId,

    /// Display alias for the actor; the remote name is used when absent
    pub alias: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two fetches of the item list
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Whether new items are forwarded to the action worker
    #[serde(default = "default_true")]
    pub action: bool,

    /// Seconds the action worker waits after each action (fractional allowed)
    #[serde(default = "default_action_pacing")]
    pub action_pacing: f64,

    /// Capacity of the action queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Regex an item payload must match to consult the latency reporter
    pub trigger: Option<String>,

    /// Post the latency report as a reply to the triggering item
    #[serde(default)]
    pub reply_on_trigger: bool,

    /// Expected systematic delay in seconds subtracted from observed latency
    #[serde(default = "default_latency_offset")]
    pub latency_offset: i64,

    /// Minimum seconds between two latency reports
    #[serde(default = "default_latency_cooldown")]
    pub latency_cooldown: i64,

    /// Whether the follower count is sampled
    #[serde(default = "default_true")]
    pub followers: bool,

    /// Seconds between two follower samples
    #[serde(default = "default_follower_interval")]
    pub follower_interval: u64,

    /// Re-resolve the container from the handle when resuming from a snapshot
    #[serde(default = "default_true")]
    pub revalidate_on_resume: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            action: true,
            action_pacing: default_action_pacing(),
            queue_capacity: default_queue_capacity(),
            trigger: None,
            reply_on_trigger: false,
            latency_offset: default_latency_offset(),
            latency_cooldown: default_latency_cooldown(),
            followers: true,
            follower_interval: default_follower_interval(),
            revalidate_on_resume: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_secs_f64(self.action_pacing)
    }

    pub fn follower_period(&self) -> Duration {
        Duration::from_secs(self.follower_interval)
    }

    pub fn trigger_regex(&self) -> anyhow::Result<Option<regex::Regex>> {
        self.trigger
            .as_deref()
            .map(|pattern| {
                regex::Regex::new(pattern).with_context(|| format!("invalid trigger pattern '{pattern}'"))
            })
            .transpose()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval == 0 {
            bail!("monitor.poll_interval must be at least 1 second");
        }
        if self.follower_interval == 0 {
            bail!("monitor.follower_interval must be at least 1 second");
        }
        if self.queue_capacity == 0 {
            bail!("monitor.queue_capacity must be at least 1");
        }
        if !self.action_pacing.is_finite() || self.action_pacing < 0.0 {
            bail!("monitor.action_pacing must be a non-negative number");
        }
        if self.latency_cooldown < 0 {
            bail!("monitor.latency_cooldown must not be negative");
        }
        self.trigger_regex()?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SummaryConfig {
    /// Directory snapshot files are written to
    #[serde(default = "default_summary_dir")]
    pub dir: PathBuf,

    /// Hour of day for the scheduled summary; `-1` or absent means every hour
    pub hour: Option<i32>,

    /// Minute of the hour for the scheduled summary
    #[serde(default)]
    pub minute: u32,

    /// External program invoked with the snapshot path appended
    pub hook: Option<Vec<String>>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            dir: default_summary_dir(),
            hour: None,
            minute: 0,
            hook: None,
        }
    }
}

impl SummaryConfig {
    /// Scheduled hour, `None` meaning every hour
    pub fn scheduled_hour(&self) -> Option<u32> {
        self.hour.and_then(|h| u32::try_from(h).ok())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(hour) = self.hour {
            if !(-1..=23).contains(&hour) {
                bail!("summary.hour must be between -1 and 23, got {hour}");
            }
        }
        if self.minute > 59 {
            bail!("summary.minute must be between 0 and 59, got {}", self.minute);
        }
        if self.hook.as_ref().is_some_and(|hook| hook.is_empty()) {
            bail!("summary.hook must name a program");
        }
        Ok(())
    }
}

/// Cookie credentials of the bot account
#[derive(Clone, Default, serde::Deserialize)]
pub struct Credentials {
    pub uid: Option<u64>,
    pub uid_md5: Option<String>,
    pub sessdata: Option<String>,
    pub csrf: Option<String>,
    pub sid: Option<String>,
}

// cookie values never reach the logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "<redacted>" } else { "<unset>" }
        }

        f.debug_struct("Credentials")
            .field("uid", &self.uid)
            .field("uid_md5", &redact(&self.uid_md5))
            .field("sessdata", &redact(&self.sessdata))
            .field("csrf", &redact(&self.csrf))
            .field("sid", &redact(&self.sid))
            .finish()
    }
}

impl Credentials {
    /// Override file values with whatever the environment provides
    pub fn with_env_overrides(mut self) -> Self {
        use crate::util::env_var;

        if let Some(uid) = env_var("FEEDWATCH_UID").and_then(|v| v.parse().ok()) {
            self.uid = Some(uid);
        }
        if let Some(v) = env_var("FEEDWATCH_UID_MD5") {
            self.uid_md5 = Some(v);
        }
        if let Some(v) = env_var("FEEDWATCH_SESSDATA") {
            self.sessdata = Some(v);
        }
        if let Some(v) = env_var("FEEDWATCH_CSRF") {
            self.csrf = Some(v);
        }
        if let Some(v) = env_var("FEEDWATCH_SID") {
            self.sid = Some(v);
        }
        self
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}

fn default_action_pacing() -> f64 {
    1.5
}

fn default_queue_capacity() -> usize {
    32
}

fn default_latency_offset() -> i64 {
    10
}

fn default_latency_cooldown() -> i64 {
    180
}

fn default_follower_interval() -> u64 {
    600
}

fn default_summary_dir() -> PathBuf {
    PathBuf::from("./summary")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_base_url() -> String {
    String::from("https://api.bilibili.com")
}

fn default_timeout() -> u64 {
    5
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.monitor.validate()?;
        self.summary.validate()?;
        Ok(())
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}
