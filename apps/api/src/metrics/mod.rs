//! Per-call AI metrics persisted through the ListStore.
//!
//! One `MetricRecord` per top-level orchestrated call. Writes are queued
//! (see `ListWriter`) and evicted down to `max_records` after every append.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{tail_window, ListStore, ListWriter};

const DEFAULT_PAGE_BYTES: usize = 700_000;
const MIN_PAGE_BYTES: usize = 64_000;
const MAX_PAGE_BYTES: usize = 900_000;
/// Upper bound on range calls per page.
const MAX_BATCHES_PER_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(default)]
    pub service_tier: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    /// Subset of `input_tokens` billed at the cached rate; not part of the total.
    #[serde(default)]
    pub cached_input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(rename = "costUSD", default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTotals {
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_input: u64,
    pub total_cached_input: u64,
    pub total_output: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsPageQuery {
    pub limit: Option<usize>,
    /// Number of tail records already paged through.
    pub cursor: usize,
    /// Soft cap on the serialized size of the page.
    pub max_bytes: Option<usize>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPage {
    pub metrics: Vec<MetricRecord>,
    pub next_cursor: Option<usize>,
}

#[derive(Clone)]
pub struct MetricsStore {
    store: Arc<dyn ListStore>,
    writer: ListWriter,
    key: Arc<str>,
    max_records: usize,
}

impl MetricsStore {
    pub fn new(store: Arc<dyn ListStore>, key: &str, max_records: usize) -> Self {
        Self {
            writer: ListWriter::spawn(store.clone(), "metrics"),
            store,
            key: Arc::from(key),
            max_records: max_records.max(10),
        }
    }

    /// Queues the record; returns immediately and never fails.
    pub fn record(&self, record: &MetricRecord) {
        match serde_json::to_string(record) {
            Ok(line) => self.writer.append(self.key.as_ref(), line, self.max_records),
            Err(e) => warn!(error = %e, "metrics: failed to serialize record"),
        }
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Every retained record, newest first.
    pub async fn recent(&self) -> Vec<MetricRecord> {
        let raw = self.read(-(self.max_records as i64), -1).await;
        let mut records = parse_records(&raw);
        records.reverse();
        records
    }

    pub async fn totals(&self) -> MetricTotals {
        let records = self.recent().await;
        let mut totals = MetricTotals::default();
        for m in &records {
            totals.total_requests += 1;
            totals.total_cost += m.cost_usd.unwrap_or(0.0);
            totals.total_input += m.input_tokens.unwrap_or(0);
            totals.total_cached_input += m.cached_input_tokens.unwrap_or(0);
            totals.total_output += m.output_tokens.unwrap_or(0);
        }
        totals
    }

    /// Reads newest-first from `cursor` records before the tail, in batches,
    /// until `limit` matching records are collected, the byte budget is
    /// spent, or the list is exhausted. `next_cursor` counts exactly the
    /// records examined, so filtered or truncated pages skip nothing.
    pub async fn page(&self, query: &MetricsPageQuery) -> MetricsPage {
        let page_limit = query.limit.unwrap_or(100).clamp(10, self.max_records);
        let byte_budget = query
            .max_bytes
            .unwrap_or(DEFAULT_PAGE_BYTES)
            .clamp(MIN_PAGE_BYTES, MAX_PAGE_BYTES);
        let batch_size = page_limit.clamp(25, 100);

        let mut cursor = query.cursor;
        let mut bytes_so_far = 0usize;
        let mut metrics = Vec::new();

        for _ in 0..MAX_BATCHES_PER_PAGE {
            let (start, stop) = tail_window(cursor, batch_size);
            let raw = self.read(start, stop).await;
            if raw.is_empty() {
                return MetricsPage {
                    metrics,
                    next_cursor: None,
                };
            }

            // Newest first within the window.
            for line in raw.iter().rev() {
                if metrics.len() >= page_limit {
                    return MetricsPage {
                        metrics,
                        next_cursor: Some(cursor),
                    };
                }
                if let Some(record) = parse_record(line).filter(|r| matches_filter(r, query)) {
                    if bytes_so_far + line.len() > byte_budget && !metrics.is_empty() {
                        return MetricsPage {
                            metrics,
                            next_cursor: Some(cursor),
                        };
                    }
                    bytes_so_far += line.len();
                    metrics.push(record);
                }
                cursor += 1;
            }

            // A short window means it reached the head of the list.
            if raw.len() < batch_size {
                return MetricsPage {
                    metrics,
                    next_cursor: None,
                };
            }
        }

        MetricsPage {
            metrics,
            next_cursor: Some(cursor),
        }
    }

    async fn read(&self, start: i64, stop: i64) -> Vec<String> {
        match self.store.range(&self.key, start, stop).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "metrics: range failed, returning empty result");
                Vec::new()
            }
        }
    }
}

fn matches_filter(record: &MetricRecord, query: &MetricsPageQuery) -> bool {
    if let Some(model) = &query.model {
        if &record.model != model {
            return false;
        }
    }
    if let Some(endpoint) = &query.endpoint {
        if record.endpoint.as_ref() != Some(endpoint) {
            return false;
        }
    }
    true
}

fn parse_record(line: &str) -> Option<MetricRecord> {
    match serde_json::from_str(line) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!(error = %e, "metrics: skipping malformed record");
            None
        }
    }
}

fn parse_records(raw: &[String]) -> Vec<MetricRecord> {
    raw.iter().filter_map(|l| parse_record(l)).collect()
}
