use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{normalize_range, ListStore, StorageError};

/// Process-lifetime list store. Each instance is independent, so tests get
/// isolation by constructing a fresh one.
#[derive(Default)]
pub struct InMemoryListStore {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn push(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError> {
        let lists = self.lists.lock();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match normalize_range(list.len(), start, stop) {
            Some((a, b)) => list[a..=b].to_vec(),
            None => Vec::new(),
        })
    }

    async fn trim_to_last(&self, key: &str, max: usize) -> Result<(), StorageError> {
        let mut lists = self.lists.lock();
        if let Some(list) = lists.get_mut(key) {
            if list.len() > max {
                let excess = list.len() - max;
                list.drain(..excess);
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
