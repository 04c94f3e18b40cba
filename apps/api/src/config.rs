use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::ServiceTier;

/// Which ListStore backend persists logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub service_tier: ServiceTier,
    pub ai_deadline: Duration,
    pub storage_backend: StorageBackend,
    pub redis_url: Option<String>,
    pub data_dir: PathBuf,
    pub log_key: String,
    pub log_max_lines: usize,
    pub log_level: String,
    pub log_console: bool,
    pub metrics_key: String,
    pub metrics_max_records: usize,
    pub metrics_password: Option<String>,
    pub auth_secret: Option<String>,
    pub analyze_rate_limit: u32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let redis_url = optional_env("REDIS_URL");
        let data_dir = optional_env("DATA_DIR");
        let storage_backend = match optional_env("STORAGE_BACKEND").as_deref() {
            Some("memory") => StorageBackend::Memory,
            Some("file") => StorageBackend::File,
            Some("redis") => StorageBackend::Redis,
            Some(other) => anyhow::bail!("STORAGE_BACKEND must be memory, file or redis (got '{other}')"),
            None if redis_url.is_some() => StorageBackend::Redis,
            None if data_dir.is_some() => StorageBackend::File,
            None => StorageBackend::Memory,
        };
        let metrics_password = optional_env("METRICS_PASSWORD");

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: optional_env("OPENAI_MODEL").unwrap_or_else(|| "gpt-5-nano".to_string()),
            service_tier: ServiceTier::from_config(
                optional_env("OPENAI_SERVICE_TIER").as_deref().unwrap_or("flex"),
            ),
            ai_deadline: Duration::from_secs(parse_env("AI_DEADLINE_SECS", 90)?),
            storage_backend,
            redis_url,
            data_dir: data_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".data").join("atsbuddy")),
            log_key: optional_env("LOG_KEY").unwrap_or_else(|| "atsbuddy:logs".to_string()),
            log_max_lines: parse_env("LOG_MAX_LINES", 1000)?,
            log_level: optional_env("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_console: parse_env("LOG_CONSOLE", true)?,
            metrics_key: optional_env("METRICS_KEY")
                .unwrap_or_else(|| "atsbuddy:metrics".to_string()),
            metrics_max_records: parse_env("METRICS_MAX_RECORDS", 500)?,
            auth_secret: optional_env("METRICS_AUTH_SECRET").or_else(|| metrics_password.clone()),
            metrics_password,
            analyze_rate_limit: parse_env("ANALYZE_RATE_LIMIT", 10)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// In-memory configuration for tests; no environment access.
    pub fn for_tests() -> Self {
        Config {
            openai_api_key: "test-key".to_string(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            openai_model: "gpt-5-nano".to_string(),
            service_tier: ServiceTier::Flex,
            ai_deadline: Duration::from_secs(30),
            storage_backend: StorageBackend::Memory,
            redis_url: None,
            data_dir: PathBuf::from(".data-test"),
            log_key: "test:logs".to_string(),
            log_max_lines: 1000,
            log_level: "debug".to_string(),
            log_console: false,
            metrics_key: "test:metrics".to_string(),
            metrics_max_records: 500,
            metrics_password: Some("hunter2".to_string()),
            auth_secret: Some("test-secret".to_string()),
            analyze_rate_limit: 100,
            port: 0,
            rust_log: "info".to_string(),
        }
    }
}
