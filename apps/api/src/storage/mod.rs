//! Append-only, ordered string lists keyed by name.
//!
//! Logs and metrics are both persisted through this abstraction. Three
//! backends implement it: in-process memory, one file per key, and a remote
//! Redis list. No backend is authoritative; the choice is made at startup.
//!
//! Consistency: `range` is a best-effort snapshot. Negative indices are
//! resolved against the list length at read time, so a push that lands
//! between two paged reads shifts absolute positions by one (a record may
//! repeat across adjacent pages or be skipped). `trim_to_last` is not atomic
//! with concurrent pushes; it may keep a few extra entries under a race but
//! never removes more than requested.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, StorageBackend};

pub mod file;
pub mod memory;
pub mod remote;
pub mod writer;

pub use file::FileListStore;
pub use memory::InMemoryListStore;
pub use remote::{RedisListClient, RemoteListStore};
pub use writer::ListWriter;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[async_trait]
pub trait ListStore: Send + Sync {
    /// Appends `value` to the tail of the list at `key`.
    async fn push(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Inclusive slice with Redis LRANGE index semantics.
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError>;

    /// Keeps only the most recent `max` entries. `max == 0` empties the list.
    async fn trim_to_last(&self, key: &str, max: usize) -> Result<(), StorageError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Resolves Redis-style `start`/`stop` against a list of length `len`.
///
/// Negative indices count from the tail (`-1` is the last element). A start
/// before the head clamps to 0, a stop past the tail clamps to `len - 1`.
/// Returns `None` when the resolved range is empty.
pub fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if start > stop || start >= len {
        return None;
    }
    if stop >= len {
        stop = len - 1;
    }
    Some((start as usize, stop as usize))
}

/// `(start, stop)` for the `size` entries that end `cursor` entries before
/// the tail. Saturates, so a cursor past any real list length resolves to an
/// empty window instead of overflowing.
pub fn tail_window(cursor: usize, size: usize) -> (i64, i64) {
    let from_tail = |n: usize| -i64::try_from(n).unwrap_or(i64::MAX);
    (
        from_tail(cursor.saturating_add(size.max(1))),
        from_tail(cursor.saturating_add(1)),
    )
}

/// Builds the configured backend. Called once at startup; the returned handle
/// is shared by the logger, the log reader and the metrics store.
pub async fn build_list_store(config: &Config) -> anyhow::Result<Arc<dyn ListStore>> {
    let store: Arc<dyn ListStore> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(InMemoryListStore::new()),
        StorageBackend::File => Arc::new(FileListStore::new(config.data_dir.clone())),
        StorageBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("STORAGE_BACKEND=redis requires REDIS_URL"))?;
            let client = RedisListClient::connect(url).await?;
            Arc::new(RemoteListStore::new(client))
        }
    };
    Ok(store)
}
