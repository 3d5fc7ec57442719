pub mod actors;
pub mod config;
pub mod engine;
pub mod feed;
pub mod hook;
pub mod notify;
pub mod snapshot;
pub mod storage;
pub mod util;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a single feed entry (the remote reply id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an actor (account) on the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The comment container a poll cycle fetches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedIdentity {
    /// Container id (`oid` on the remote side)
    pub container_id: u64,

    /// Container kind (`type` code on the remote side)
    pub container_kind: i32,
}

impl fmt::Display for FeedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_kind, self.container_id)
    }
}

/// One observed feed entry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub actor_id: ActorId,
    pub actor_name: String,
    /// Emission time, seconds since epoch
    pub emitted_at: i64,
    pub payload: String,
    pub feed: FeedIdentity,
}

/// Comment counters of a container at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerCounts {
    /// All comments, nested replies included
    pub total: u64,

    /// Top-level comments only
    pub top_level: u64,
}

/// Resolved metadata for a container handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMeta {
    pub identity: FeedIdentity,
    pub name: String,
    pub counts: ContainerCounts,
}

/// Display metadata of an actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMeta {
    pub name: String,
    pub avatar: String,
    pub bio: String,
}
