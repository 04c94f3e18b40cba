mod admin;
mod analysis;
mod config;
mod errors;
mod llm_client;
mod logging;
mod metrics;
mod rate_limit;
mod routes;
mod state;
mod storage;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::admin::auth::TokenSigner;
use crate::config::Config;
use crate::llm_client::{AiManager, OpenAiResponses, RetryPolicy};
use crate::logging::{LogLevel, LogReader, Logger};
use crate::metrics::MetricsStore;
use crate::rate_limit::RateLimiter;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::build_list_store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Logs and metrics share one list store
    let store = build_list_store(&config).await?;
    let min_level: LogLevel = config.log_level.parse().map_err(anyhow::Error::msg)?;
    let logger = Logger::new(store.clone(), &config.log_key, config.log_max_lines, min_level);

    // Console output is optional; the persisted log is always on
    let console = config.log_console.then(|| {
        tracing_subscriber::fmt::layer().with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
    });
    tracing_subscriber::registry()
        .with(console)
        .with(logger.layer())
        .init();

    info!(
        storage = store.backend_name(),
        "Starting ATS Buddy API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let metrics = MetricsStore::new(store.clone(), &config.metrics_key, config.metrics_max_records);

    // Initialize the AI orchestrator
    let api = OpenAiResponses::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        config.ai_deadline,
    )?;
    let ai = AiManager::new(
        Arc::new(api),
        metrics.clone(),
        config.openai_model.clone(),
        config.service_tier,
        RetryPolicy {
            deadline: config.ai_deadline,
            ..RetryPolicy::default()
        },
    );
    info!(
        "AI manager initialized (model: {}, tier: {})",
        config.openai_model,
        config.service_tier.as_str()
    );

    if config.metrics_password.is_none() {
        warn!("METRICS_PASSWORD is not set; admin endpoints are disabled");
    }

    let state = AppState {
        logs: LogReader::new(store.clone(), &config.log_key, config.log_max_lines),
        signer: config.auth_secret.as_deref().map(TokenSigner::new),
        rate_limiter: Arc::new(RateLimiter::new(
            config.analyze_rate_limit,
            Duration::from_secs(60),
        )),
        ai,
        metrics: metrics.clone(),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down; flushing queued logs and metrics");
    metrics.flush().await;
    logger.flush().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
