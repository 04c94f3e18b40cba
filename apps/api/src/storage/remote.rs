//! Remote list backend.
//!
//! Remote key-value services cap the payload of a single call, so `range`
//! never asks for more than `chunk_size` elements at once. The requested
//! window is resolved to absolute indices with one LLEN, then read in
//! ascending chunks. A failing chunk is split in half and each half retried,
//! down to single elements; an element that still fails is skipped and logged.

use std::collections::VecDeque;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::{normalize_range, ListStore, StorageError};

/// Conservative per-call element count.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// The handful of list commands the remote store needs.
#[async_trait]
pub trait RemoteListClient: Send + Sync {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn llen(&self, key: &str) -> Result<usize, StorageError>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StorageError>;
    async fn del(&self, key: &str) -> Result<(), StorageError>;
}

pub struct RemoteListStore<C> {
    client: C,
    chunk_size: usize,
}

impl<C: RemoteListClient> RemoteListStore<C> {
    pub fn new(client: C) -> Self {
        Self::with_chunk_size(client, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(client: C, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Reads `[first, last]` (absolute, inclusive) in order.
    async fn read_chunked(&self, key: &str, first: usize, last: usize) -> Vec<String> {
        let mut pending: VecDeque<(usize, usize)> = VecDeque::new();
        let mut a = first;
        while a <= last {
            let b = (a + self.chunk_size - 1).min(last);
            pending.push_back((a, b));
            a = b + 1;
        }

        let mut out = Vec::with_capacity(last - first + 1);
        while let Some((a, b)) = pending.pop_front() {
            match self.client.lrange(key, a as i64, b as i64).await {
                Ok(items) => out.extend(items),
                Err(e) if a == b => {
                    warn!(key, index = a, error = %e, "remote range: dropping unreadable element");
                }
                Err(e) => {
                    let mid = a + (b - a) / 2;
                    debug!(key, start = a, stop = b, error = %e, "remote range: bisecting failed chunk");
                    pending.push_front((mid + 1, b));
                    pending.push_front((a, mid));
                }
            }
        }
        out
    }
}

#[async_trait]
impl<C: RemoteListClient> ListStore for RemoteListStore<C> {
    async fn push(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.client.rpush(key, &value).await
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError> {
        let len = self.client.llen(key).await?;
        Ok(match normalize_range(len, start, stop) {
            Some((a, b)) => self.read_chunked(key, a, b).await,
            None => Vec::new(),
        })
    }

    async fn trim_to_last(&self, key: &str, max: usize) -> Result<(), StorageError> {
        if max == 0 {
            return self.client.del(key).await;
        }
        self.client.ltrim(key, -(max as i64), -1).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Redis implementation over a multiplexed connection (cheap to clone per call).
pub struct RedisListClient {
    conn: MultiplexedConnection,
}

impl RedisListClient {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RemoteListClient for RedisListClient {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<usize, StorageError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen::<_, usize>(key).await?)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn.clone();
        Ok(conn
            .lrange::<_, Vec<String>>(key, start as isize, stop as isize)
            .await?)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.ltrim::<_, ()>(key, start as isize, stop as isize).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
