//! Two-phase retry with tier escalation.
//!
//! Resource-exhaustion failures are retried on the preferred tier with
//! exponential backoff plus jitter, then the same ladder runs on the fallback
//! tier. Any other error is returned immediately. The whole ladder runs
//! under one wall-clock deadline.

use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::warn;

use super::{ResponsesApi, ResponsesRequest, ServiceTier};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// HTTP 429, or a message reporting missing capacity.
    pub fn is_resource_exhausted(&self) -> bool {
        if let ProviderError::Status { status: 429, .. } = self {
            return true;
        }
        let msg = self.to_string().to_ascii_lowercase();
        msg.contains("resource unavailable") || msg.contains("capacity")
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("resource unavailable after retries")]
    ResourceExhausted,

    #[error("AI call exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_primary_attempts: u32,
    pub max_fallback_attempts: u32,
    pub max_jitter: Duration,
    /// Budget for every attempt and backoff of one orchestrated call.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_primary_attempts: 3,
            max_fallback_attempts: 2,
            max_jitter: Duration::from_millis(250),
            deadline: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt` plus uniform jitter in `[0, max_jitter]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Runs `request` through the ladder and returns the raw response with the
/// tier that served it.
pub async fn call_with_retries(
    api: &dyn ResponsesApi,
    request: &ResponsesRequest,
    preferred: ServiceTier,
    policy: &RetryPolicy,
    request_id: Option<&str>,
) -> Result<(Value, ServiceTier), AiError> {
    let deadline = Instant::now() + policy.deadline;
    let ladders = [
        (preferred, policy.max_primary_attempts, "primary"),
        (preferred.fallback(), policy.max_fallback_attempts, "fallback"),
    ];
    let final_phase = ladders.len() - 1;

    for (phase, (tier, attempts, label)) in ladders.into_iter().enumerate() {
        let mut request = request.clone();
        request.service_tier = tier;

        for attempt in 0..attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AiError::DeadlineExceeded(policy.deadline));
            }
            let err = match timeout(remaining, api.create(&request)).await {
                Err(_) => return Err(AiError::DeadlineExceeded(policy.deadline)),
                Ok(Ok(response)) => return Ok((response, tier)),
                Ok(Err(e)) if e.is_resource_exhausted() => e,
                Ok(Err(e)) => return Err(AiError::Provider(e)),
            };

            if phase == final_phase && attempt + 1 == attempts {
                break;
            }
            let delay = policy.backoff(attempt);
            warn!(
                request_id,
                ladder = label,
                service_tier = tier.as_str(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "AI retry"
            );
            if Instant::now() + delay >= deadline {
                return Err(AiError::DeadlineExceeded(policy.deadline));
            }
            tokio::time::sleep(delay).await;
        }
    }

    Err(AiError::ResourceExhausted)
}
