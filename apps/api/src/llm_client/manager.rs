use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info};

use super::extract::extract_structured;
use super::pricing::estimate_cost_usd;
use super::response::NormalizedResponse;
use super::retry::{call_with_retries, AiError, RetryPolicy};
use super::{ResponsesApi, ResponsesRequest, ServiceTier, StructuredRequest};
use crate::metrics::{MetricRecord, MetricsStore};

/// Request orchestrator: one call in, one structured value out, one metric
/// record and one "AI response" log line per answered call.
#[derive(Clone)]
pub struct AiManager {
    api: Arc<dyn ResponsesApi>,
    metrics: MetricsStore,
    default_model: String,
    preferred_tier: ServiceTier,
    policy: RetryPolicy,
}

impl AiManager {
    pub fn new(
        api: Arc<dyn ResponsesApi>,
        metrics: MetricsStore,
        default_model: impl Into<String>,
        preferred_tier: ServiceTier,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            metrics,
            default_model: default_model.into(),
            preferred_tier,
            policy,
        }
    }

    pub async fn create_json_response(&self, req: StructuredRequest) -> Result<Value, AiError> {
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());
        let request = ResponsesRequest::build(&req, &model, self.preferred_tier);
        let request_id = req.request_id.as_deref();

        let started = Instant::now();
        info!(
            request_id,
            model = %model,
            temperature = req.temperature.unwrap_or(1.0) as f64,
            service_tier = self.preferred_tier.as_str(),
            max_output_tokens = req.max_output_tokens,
            system_chars = req.system.chars().count() as u64,
            user_chars = req.user.chars().count() as u64,
            schema = %req.schema.name,
            "AI request"
        );

        let (raw, used_tier) = match call_with_retries(
            self.api.as_ref(),
            &request,
            self.preferred_tier,
            &self.policy,
            request_id,
        )
        .await
        {
            Ok(ok) => ok,
            Err(e) => {
                error!(
                    request_id,
                    model = %model,
                    latency_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "AI request failed"
                );
                return Err(e);
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let response = NormalizedResponse::from_value(&raw);
        let usage = &response.usage;
        let total_tokens = usage.total();
        let cost_usd = estimate_cost_usd(
            &model,
            used_tier.as_str(),
            usage.input_tokens.unwrap_or(0),
            usage.cached_input_tokens.unwrap_or(0),
            usage.output_tokens.unwrap_or(0),
        );
        let extracted = extract_structured(&response);

        self.metrics.record(&MetricRecord {
            timestamp: chrono::Utc::now().timestamp_millis(),
            request_id: req.request_id.clone(),
            endpoint: req.metadata.get("endpoint").cloned(),
            model: model.clone(),
            service_tier: Some(used_tier.as_str().to_string()),
            input_tokens: usage.input_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens,
            latency_ms: Some(latency_ms),
            cost_usd: Some(cost_usd),
        });
        info!(
            request_id,
            model = response.model.as_deref().unwrap_or(&model),
            response_id = response.id.as_deref(),
            service_tier = used_tier.as_str(),
            latency_ms,
            input_tokens = usage.input_tokens,
            cached_input_tokens = usage.cached_input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens,
            cost_usd,
            has_output_json = extracted.source.is_native_json(),
            text_length = extracted.text_length as u64,
            "AI response"
        );

        Ok(extracted.value)
    }
}
