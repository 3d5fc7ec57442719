//! Remote feed client abstraction
//!
//! The engine talks to the remote comment service only through the
//! [`FeedClient`] trait. Transport, authentication and per-call retries are
//! owned by the implementation; the engine treats every failed call as a
//! transient, isolated failure.

pub mod bilibili;

use std::fmt;

use async_trait::async_trait;

use crate::{ActorId, ActorMeta, ContainerMeta, FeedIdentity, Item};

pub use bilibili::BiliClient;

/// Result type alias for feed client calls
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors returned by a feed client
#[derive(Debug)]
pub enum FeedError {
    /// The request never produced a response (connect, timeout, TLS, ...)
    Transport(String),

    /// The service answered with a non-success HTTP status
    Http(u16),

    /// The service answered with an error envelope
    Api { code: i64, message: String },

    /// The response body could not be decoded
    Decode(String),

    /// Credentials are missing or were rejected
    Unauthenticated(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "request failed: {}", msg),
            FeedError::Http(status) => write!(f, "HTTP error: {}", status),
            FeedError::Api { code, message } => write!(f, "API error {}: {}", code, message),
            FeedError::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            FeedError::Unauthenticated(msg) => write!(f, "not authenticated: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FeedError::Http(status.as_u16())
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

/// Client for the remote comment service
///
/// Implementations must be `Send + Sync`; a single client is shared by the
/// poll scheduler, the follower poller and the action worker.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Name of the authenticated account. Fails when credentials are invalid.
    async fn whoami(&self) -> FeedResult<String>;

    /// Current item list of a container, oldest first
    async fn fetch_items(&self, feed: &FeedIdentity) -> FeedResult<Vec<Item>>;

    /// Resolve a container handle into its identity, name and counters
    async fn fetch_container_meta(&self, handle: u64) -> FeedResult<ContainerMeta>;

    async fn fetch_actor_meta(&self, actor: ActorId) -> FeedResult<ActorMeta>;

    /// Follower count of an actor
    async fn fetch_actor_stat(&self, actor: ActorId) -> FeedResult<u64>;

    /// Perform the triggered action (a like) on an item.
    ///
    /// `Ok(false)` means the service declined without a transport error.
    async fn perform_action(&self, item: &Item) -> FeedResult<bool>;

    /// Post `text` as a reply to `item`
    async fn post_reply(&self, item: &Item, text: &str) -> FeedResult<()>;
}
