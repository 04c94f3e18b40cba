use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::{request_log_key, LogLevel};
use crate::storage::{tail_window, ListStore};

/// Filters for one page of logs.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Read this request's dedicated key instead of the global stream.
    pub request_id: Option<String>,
    /// Global stream only: show lines without a request id instead of lines with one.
    pub unattributed: bool,
    /// Empty means every level.
    pub levels: Vec<LogLevel>,
    pub limit: Option<usize>,
    /// Number of tail entries already paged through.
    pub cursor: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub entries: Vec<Value>,
    pub next_cursor: Option<usize>,
}

/// Query side of the persisted log: newest-first pages with cursor paging.
#[derive(Clone)]
pub struct LogReader {
    store: Arc<dyn ListStore>,
    key: Arc<str>,
    max_lines: usize,
}

impl LogReader {
    pub fn new(store: Arc<dyn ListStore>, key: &str, max_lines: usize) -> Self {
        Self {
            store,
            key: Arc::from(key),
            max_lines: max_lines.max(10),
        }
    }

    /// Reads one window of `limit` raw lines ending `cursor` lines before the
    /// tail, then filters it. Filtering happens after the window is chosen,
    /// so a page can hold fewer than `limit` entries while `next_cursor`
    /// still advances by the full window.
    pub async fn load(&self, query: &LogQuery) -> LogPage {
        let page_limit = query.limit.unwrap_or(100).clamp(10, self.max_lines);
        let key = match &query.request_id {
            Some(id) => request_log_key(&self.key, id),
            None => self.key.to_string(),
        };
        let (start, stop) = tail_window(query.cursor, page_limit);

        let raw = match self.store.range(&key, start, stop).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "log reader: range failed, returning empty page");
                return LogPage {
                    entries: Vec::new(),
                    next_cursor: None,
                };
            }
        };

        let mut parsed: Vec<Value> = raw
            .iter()
            .filter_map(|line| match serde_json::from_str::<Value>(line) {
                Ok(v) if v.is_object() => Some(v),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "log reader: skipping malformed line");
                    None
                }
            })
            .collect();
        // Window is in append order; reverse first so equal timestamps stay newest-first.
        parsed.reverse();
        parsed.sort_by_key(|e| std::cmp::Reverse(entry_millis(e)));

        let entries = parsed
            .into_iter()
            .filter(|e| level_matches(e, &query.levels))
            .filter(|e| {
                if query.request_id.is_some() {
                    return true;
                }
                has_request_id(e) != query.unattributed
            })
            .take(page_limit)
            .collect();

        let next_cursor = if raw.len() < page_limit {
            None
        } else {
            Some(query.cursor.saturating_add(raw.len()))
        };
        LogPage {
            entries,
            next_cursor,
        }
    }
}

fn entry_millis(entry: &Value) -> i64 {
    entry
        .get("ts")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map_or(0, |t| t.timestamp_millis())
}

fn has_request_id(entry: &Value) -> bool {
    entry
        .get("requestId")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn level_matches(entry: &Value, levels: &[LogLevel]) -> bool {
    if levels.is_empty() {
        return true;
    }
    entry
        .get("level")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<LogLevel>().ok())
        .is_some_and(|l| levels.contains(&l))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::*;
    use crate::logging::{LogEntry, Logger};
    use crate::storage::InMemoryListStore;

    fn fields(request_id: Option<&str>) -> Map<String, Value> {
        let mut m = Map::new();
        if let Some(id) = request_id {
            m.insert("request_id".into(), json!(id));
        }
        m
    }

    async fn seeded() -> (Arc<InMemoryListStore>, LogReader) {
        let store = Arc::new(InMemoryListStore::new());
        let logger = Logger::new(store.clone(), "logs", 1000, LogLevel::Debug);
        for i in 0..30 {
            let rid = if i % 3 == 0 { None } else { Some(format!("r{}", i % 2)) };
            let level = if i % 5 == 0 { LogLevel::Error } else { LogLevel::Info };
            logger.log(level, format!("m{i}"), fields(rid.as_deref()));
        }
        logger.flush().await;
        let reader = LogReader::new(store.clone(), "logs", 1000);
        (store, reader)
    }

    fn msgs(page: &LogPage) -> Vec<String> {
        page.entries
            .iter()
            .map(|e| e["msg"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_default_view_shows_attributed_newest_first() {
        let (_, reader) = seeded().await;
        let page = reader
            .load(&LogQuery {
                limit: Some(10),
                ..Default::default()
            })
            .await;
        // Window m20..m29; unattributed are multiples of 3 (m21, m24, m27).
        assert_eq!(msgs(&page), vec!["m29", "m28", "m26", "m25", "m23", "m22", "m20"]);
        assert_eq!(page.next_cursor, Some(10));
    }

    #[tokio::test]
    async fn test_unattributed_view() {
        let (_, reader) = seeded().await;
        let page = reader
            .load(&LogQuery {
                unattributed: true,
                limit: Some(10),
                ..Default::default()
            })
            .await;
        assert_eq!(msgs(&page), vec!["m27", "m24", "m21"]);
    }

    #[tokio::test]
    async fn test_request_scope_uses_request_key() {
        let (_, reader) = seeded().await;
        let page = reader
            .load(&LogQuery {
                request_id: Some("r1".into()),
                limit: Some(100),
                ..Default::default()
            })
            .await;
        assert!(!page.entries.is_empty());
        assert!(page.entries.iter().all(|e| e["requestId"] == "r1"));
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_level_filter() {
        let (_, reader) = seeded().await;
        let page = reader
            .load(&LogQuery {
                levels: vec![LogLevel::Error],
                limit: Some(100),
                ..Default::default()
            })
            .await;
        // Errors at 0,5,10,15,20,25; attributed ones exclude multiples of 3.
        assert_eq!(msgs(&page), vec!["m25", "m20", "m10", "m5"]);
    }

    #[tokio::test]
    async fn test_cursor_pages_walk_backwards_and_end() {
        let (_, reader) = seeded().await;
        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = reader
                .load(&LogQuery {
                    unattributed: true,
                    limit: Some(10),
                    cursor,
                    ..Default::default()
                })
                .await;
            seen.extend(msgs(&page));
            match page.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }
        assert_eq!(seen, vec!["m27", "m24", "m21", "m18", "m15", "m12", "m9", "m6", "m3", "m0"]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let store = Arc::new(InMemoryListStore::new());
        store.push("logs", "not json".into()).await.unwrap();
        store.push("logs", "[1,2]".into()).await.unwrap();
        let entry = LogEntry::new(LogLevel::Info, "ok", fields(Some("r")));
        store
            .push("logs", serde_json::to_string(&entry).unwrap())
            .await
            .unwrap();
        let reader = LogReader::new(store, "logs", 1000);
        let page = reader.load(&LogQuery::default()).await;
        assert_eq!(msgs(&page), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_cursor_past_end_returns_empty_last_page() {
        let (_, reader) = seeded().await;
        for cursor in [30, 31, usize::MAX - 5, usize::MAX] {
            let page = reader
                .load(&LogQuery {
                    unattributed: true,
                    cursor,
                    ..Default::default()
                })
                .await;
            assert!(page.entries.is_empty(), "cursor={cursor}");
            assert_eq!(page.next_cursor, None, "cursor={cursor}");
        }
    }
}
