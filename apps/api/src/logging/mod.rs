//! Persisted application logs.
//!
//! Code logs with ordinary `tracing` macros. `StoreLayer` turns every event
//! from this crate at or above the configured level into one JSON line
//! `{ts, level, msg, requestId?, ...fields}` and hands it to the `Logger`,
//! which appends it through a `ListWriter` to the global key and, when the
//! event carries a `request_id`, to that request's own key. Emission never
//! waits on storage; the queue keeps lines in emission order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::storage::writer::SINK_TARGET;
use crate::storage::{ListStore, ListWriter};

pub mod reader;

pub use reader::{LogPage, LogQuery, LogReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// TRACE has no persisted counterpart.
    fn from_tracing(level: &Level) -> Option<Self> {
        match *level {
            Level::ERROR => Some(LogLevel::Error),
            Level::WARN => Some(LogLevel::Warn),
            Level::INFO => Some(LogLevel::Info),
            Level::DEBUG => Some(LogLevel::Debug),
            Level::TRACE => None,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted log line. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, msg: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        let request_id = ["request_id", "requestId"]
            .iter()
            .find_map(|k| fields.remove(*k))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            });
        Self {
            ts: Utc::now(),
            level,
            msg: msg.into(),
            request_id,
            fields,
        }
    }
}

/// Key holding one request's log lines.
pub fn request_log_key(log_key: &str, request_id: &str) -> String {
    format!("{log_key}:req:{request_id}")
}

#[derive(Clone)]
pub struct Logger {
    writer: ListWriter,
    key: Arc<str>,
    max_lines: usize,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(store: Arc<dyn ListStore>, key: &str, max_lines: usize, min_level: LogLevel) -> Self {
        Self {
            writer: ListWriter::spawn(store, "logs"),
            key: Arc::from(key),
            max_lines,
            min_level,
        }
    }

    /// No-op below the minimum level. Never blocks, never fails.
    pub fn log(&self, level: LogLevel, msg: impl Into<String>, fields: Map<String, Value>) {
        if level < self.min_level {
            return;
        }
        self.write(LogEntry::new(level, msg, fields));
    }

    fn write(&self, entry: LogEntry) {
        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        if let Some(request_id) = &entry.request_id {
            self.writer.append(
                request_log_key(&self.key, request_id),
                line.clone(),
                self.max_lines,
            );
        }
        self.writer.append(self.key.as_ref(), line, self.max_lines);
    }

    /// Waits for every line logged so far to reach the store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn layer(&self) -> StoreLayer {
        StoreLayer {
            logger: self.clone(),
        }
    }
}

/// `tracing` layer feeding the persisted log.
pub struct StoreLayer {
    logger: Logger,
}

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

impl<S: Subscriber> Layer<S> for StoreLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == SINK_TARGET || !meta.target().starts_with(CRATE_TARGET) {
            return;
        }
        let Some(level) = LogLevel::from_tracing(meta.level()) else {
            return;
        };
        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        self.logger.log(level, fields.message, fields.values);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    values: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.values.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let v = serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, v);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::storage::InMemoryListStore;

    fn logger(min: LogLevel) -> (Arc<InMemoryListStore>, Logger) {
        let store = Arc::new(InMemoryListStore::new());
        let logger = Logger::new(store.clone(), "logs", 100, min);
        (store, logger)
    }

    async fn entries(store: &InMemoryListStore, key: &str) -> Vec<LogEntry> {
        store
            .range(key, 0, -1)
            .await
            .unwrap()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn test_entry_serializes_request_id_camel_case() {
        let mut fields = Map::new();
        fields.insert("request_id".into(), json!("abc"));
        fields.insert("latency_ms".into(), json!(12));
        let entry = LogEntry::new(LogLevel::Info, "AI response", fields);
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["requestId"], "abc");
        assert_eq!(v["msg"], "AI response");
        assert_eq!(v["level"], "info");
        assert_eq!(v["latency_ms"], 12);
        assert!(v.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_below_min_level_is_dropped() {
        let (store, logger) = logger(LogLevel::Warn);
        logger.log(LogLevel::Info, "quiet", Map::new());
        logger.log(LogLevel::Error, "loud", Map::new());
        logger.flush().await;
        let got = entries(&store, "logs").await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].msg, "loud");
    }

    #[tokio::test]
    async fn test_round_trip_is_deep_equal() {
        let (store, logger) = logger(LogLevel::Debug);
        let mut fields = Map::new();
        fields.insert("requestId".into(), json!("r-1"));
        fields.insert("costUSD".into(), json!(0.000123));
        fields.insert("nested".into(), json!({"a": [1, 2, {"b": null}]}));
        let entry = LogEntry::new(LogLevel::Warn, "retry", fields);
        logger.write(entry.clone());
        logger.flush().await;
        let got = entries(&store, "logs").await;
        assert_eq!(got, vec![entry]);
    }

    #[tokio::test]
    async fn test_attributed_lines_also_go_to_request_key() {
        let (store, logger) = logger(LogLevel::Debug);
        let mut fields = Map::new();
        fields.insert("request_id".into(), json!("r-9"));
        logger.log(LogLevel::Info, "attributed", fields);
        logger.log(LogLevel::Info, "global only", Map::new());
        logger.flush().await;
        assert_eq!(entries(&store, "logs").await.len(), 2);
        let scoped = entries(&store, &request_log_key("logs", "r-9")).await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].msg, "attributed");
    }

    #[tokio::test]
    async fn test_emission_order_is_preserved() {
        let (store, logger) = logger(LogLevel::Debug);
        for i in 0..50 {
            logger.log(LogLevel::Info, format!("line {i}"), Map::new());
        }
        logger.flush().await;
        let msgs: Vec<String> = entries(&store, "logs").await.into_iter().map(|e| e.msg).collect();
        let expected: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        assert_eq!(msgs, expected);
    }

    #[tokio::test]
    async fn test_tracing_events_are_persisted_through_layer() {
        let (store, logger) = logger(LogLevel::Info);
        let subscriber = tracing_subscriber::registry().with(logger.layer());
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(request_id = "req-7", latency_ms = 42u64, ok = true, "AI response");
        tracing::debug!("below threshold");
        tracing::info!(target: "hyper::proto", "foreign crate");
        tracing::warn!(target: SINK_TARGET, "sink diagnostics");

        logger.flush().await;
        let got = entries(&store, "logs").await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].msg, "AI response");
        assert_eq!(got[0].request_id.as_deref(), Some("req-7"));
        assert_eq!(got[0].fields["latency_ms"], 42);
        assert_eq!(got[0].fields["ok"], true);
    }
}
