//! Serialized, non-blocking writes to a ListStore.
//!
//! Each sink (logs, metrics) owns one `ListWriter`: a single consumer task
//! draining an unbounded FIFO channel. Callers enqueue and return
//! immediately; operations run one at a time in submission order, each
//! completing (push, then trim) before the next starts. Storage failures are
//! reported and dropped so the request path is never affected.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::ListStore;

/// Target used for the writer's own diagnostics. The persisted-log layer
/// ignores it so a failing store cannot feed itself.
pub const SINK_TARGET: &str = "list_sink";

enum WriteOp {
    Append {
        key: String,
        value: String,
        keep_last: usize,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct ListWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl ListWriter {
    /// Spawns the consumer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn ListStore>, sink: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Append {
                        key,
                        value,
                        keep_last,
                    } => {
                        if let Err(e) = store.push(&key, value).await {
                            warn!(target: SINK_TARGET, sink, key = %key, error = %e, "list push failed");
                            continue;
                        }
                        if let Err(e) = store.trim_to_last(&key, keep_last).await {
                            warn!(target: SINK_TARGET, sink, key = %key, error = %e, "list trim failed");
                        }
                    }
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueues `value` for `key`, evicting down to `keep_last` afterwards.
    pub fn append(&self, key: impl Into<String>, value: String, keep_last: usize) {
        let _ = self.tx.send(WriteOp::Append {
            key: key.into(),
            value,
            keep_last,
        });
    }

    /// Resolves once every operation enqueued before this call has completed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
