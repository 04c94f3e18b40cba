use std::sync::Arc;

use crate::admin::auth::TokenSigner;
use crate::config::Config;
use crate::llm_client::AiManager;
use crate::logging::LogReader;
use crate::metrics::MetricsStore;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once at startup; tests build a fresh one per case.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ai: AiManager,
    pub metrics: MetricsStore,
    pub logs: LogReader,
    /// `None` when no admin password or auth secret is configured.
    pub signer: Option<TokenSigner>,
    pub rate_limiter: Arc<RateLimiter>,
}
