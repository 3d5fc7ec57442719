//! Errors of the item database and the snapshot store

use std::fmt;
use std::path::PathBuf;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    /// Item database could not be opened
    ConnectionFailed(String),

    /// Insert or lookup against the item database failed
    QueryFailed(String),

    MigrationFailed(String),

    /// No snapshot at the given path
    SnapshotNotFound(PathBuf),

    /// Snapshot file exists but does not decode
    InvalidSnapshot { path: PathBuf, reason: String },

    /// Row or snapshot could not be encoded
    Encoding(String),

    Io(std::io::Error),
}

impl StorageError {
    /// Classify a failed snapshot read of `path`
    pub fn snapshot_read(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::SnapshotNotFound(path.into()),
            _ => StorageError::Io(err),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to open item database: {msg}")
            }
            StorageError::QueryFailed(msg) => write!(f, "item query failed: {msg}"),
            StorageError::MigrationFailed(msg) => write!(f, "item schema migration failed: {msg}"),
            StorageError::SnapshotNotFound(path) => {
                write!(f, "no snapshot at {}", path.display())
            }
            StorageError::InvalidSnapshot { path, reason } => {
                write!(f, "invalid snapshot {}: {reason}", path.display())
            }
            StorageError::Encoding(msg) => write!(f, "encoding failed: {msg}"),
            StorageError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Io(io_err),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
