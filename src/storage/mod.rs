//! Durable storage of observed items
//!
//! Every new item the poll scheduler sees is handed to an [`ItemRecorder`].
//! Recording is fire-and-forget: the recorder must never block the poll loop
//! and never report failure to it. The production recorder is the
//! [`crate::actors::storage::StorageHandle`], which batches rows into an
//! [`ItemStore`] backend.
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database, one row per observed item
//! - **In-Memory**: no persistence, for tests or `"backend": "none"`

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{ItemRecorder, ItemStore, NullRecorder};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryItemStore;
pub use schema::ItemRow;
