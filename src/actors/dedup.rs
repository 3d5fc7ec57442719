//! Dedup window over the most recent fetch
//!
//! The window holds the item ids returned by the last successful fetch. An
//! item is new when its id is not in the window. After a completed cycle the
//! window is replaced wholesale by the ids of that fetch, so its size is
//! bounded by one fetch page.

use std::collections::HashSet;

use crate::{Item, ItemId};

#[derive(Debug, Clone, Default)]
pub struct DedupWindow {
    ids: HashSet<ItemId>,
    seeded: bool,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a first fetch has populated the window
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Items of `fetched` not present in the window, in fetch order
    pub fn diff<'a>(&self, fetched: &'a [Item]) -> Vec<&'a Item> {
        fetched
            .iter()
            .filter(|item| !self.ids.contains(&item.id))
            .collect()
    }

    /// Replace the window with the ids of `fetched`
    pub fn replace(&mut self, fetched: &[Item]) {
        self.ids = fetched.iter().map(|item| item.id).collect();
        self.seeded = true;
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
