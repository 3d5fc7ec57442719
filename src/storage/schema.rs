//! Row definition for stored items

use serde::{Deserialize, Serialize};

use crate::Item;

/// A single observed item as written to the item store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    pub container_id: u64,
    pub container_kind: i32,
    pub item_id: u64,
    pub actor_id: u64,
    pub actor_name: String,
    /// Emission time, seconds since epoch
    pub emitted_at: i64,
    /// When the engine first saw the item, seconds since epoch
    pub observed_at: i64,
    pub payload: String,
}

impl ItemRow {
    pub fn from_item(item: &Item, observed_at: i64) -> Self {
        Self {
            container_id: item.feed.container_id,
            container_kind: item.feed.container_kind,
            item_id: item.id.0,
            actor_id: item.actor_id.0,
            actor_name: item.actor_name.clone(),
            emitted_at: item.emitted_at,
            observed_at,
            payload: item.payload.clone(),
        }
    }
}
