//! LLM client: the single point of entry for all model calls in ATS Buddy.
//!
//! ARCHITECTURAL RULE: No other module may call the provider directly.
//! All LLM interactions MUST go through `AiManager`, which owns retries,
//! output extraction, cost accounting, and the per-call metric + log line.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod extract;
pub mod manager;
pub mod pricing;
pub mod response;
pub mod retry;

pub use manager::AiManager;
pub use retry::{AiError, ProviderError, RetryPolicy};

/// Tag attached to every request's provider-side metadata.
const PROJECT_TAG: &str = "atsbuddy";
const DEFAULT_TEMPERATURE: f32 = 1.0;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Flex,
    Auto,
    Priority,
}

impl ServiceTier {
    /// `auto` and `standard` select Auto; anything unrecognized selects Flex.
    pub fn from_config(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "standard" => ServiceTier::Auto,
            "priority" => ServiceTier::Priority,
            _ => ServiceTier::Flex,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceTier::Flex => "flex",
            ServiceTier::Auto => "auto",
            ServiceTier::Priority => "priority",
        }
    }

    /// Tier escalated to once the preferred tier's ladder is exhausted.
    pub fn fallback(self) -> Self {
        match self {
            ServiceTier::Auto => ServiceTier::Flex,
            ServiceTier::Flex | ServiceTier::Priority => ServiceTier::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

impl JsonSchemaSpec {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }
}

/// One orchestrated structured-output call.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub user: String,
    pub schema: JsonSchemaSpec,
    /// Falls back to the configured model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub request_id: Option<String>,
    /// Forwarded to the provider; `endpoint` is also copied into the metric.
    pub metadata: BTreeMap<String, String>,
}

impl StructuredRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, schema: JsonSchemaSpec) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            schema,
            model: None,
            temperature: None,
            max_output_tokens: None,
            request_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Wire request
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub service_tier: ServiceTier,
    input: Vec<InputMessage>,
    text: TextConfig,
    max_output_tokens: u32,
    temperature: f32,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct InputMessage {
    role: &'static str,
    content: Vec<InputText>,
}

#[derive(Debug, Clone, Serialize)]
struct InputText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct TextConfig {
    format: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
struct JsonSchemaFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    schema: Value,
    strict: bool,
}

impl ResponsesRequest {
    pub fn build(req: &StructuredRequest, model: &str, tier: ServiceTier) -> Self {
        let message = |role, text: &str| InputMessage {
            role,
            content: vec![InputText {
                kind: "input_text",
                text: text.to_string(),
            }],
        };
        let mut metadata = req.metadata.clone();
        if let Some(id) = &req.request_id {
            metadata.insert("requestId".to_string(), id.clone());
        }
        metadata.insert("project".to_string(), PROJECT_TAG.to_string());

        Self {
            model: model.to_string(),
            service_tier: tier,
            input: vec![message("system", &req.system), message("user", &req.user)],
            text: TextConfig {
                format: JsonSchemaFormat {
                    kind: "json_schema",
                    name: req.schema.name.clone(),
                    schema: req.schema.schema.clone(),
                    strict: req.schema.strict,
                },
            },
            max_output_tokens: req.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            temperature: req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            metadata,
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Provider transport
// ────────────────────────────────────────────────────────────────

/// Seam between the orchestrator and the provider's Responses endpoint.
#[async_trait]
pub trait ResponsesApi: Send + Sync {
    async fn create(&self, request: &ResponsesRequest) -> Result<Value, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// OpenAI Responses API over reqwest.
#[derive(Clone)]
pub struct OpenAiResponses {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiResponses {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ResponsesApi for OpenAiResponses {
    async fn create(&self, request: &ResponsesRequest) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tier_from_config() {
        assert_eq!(ServiceTier::from_config("standard"), ServiceTier::Auto);
        assert_eq!(ServiceTier::from_config("AUTO"), ServiceTier::Auto);
        assert_eq!(ServiceTier::from_config("priority"), ServiceTier::Priority);
        assert_eq!(ServiceTier::from_config(""), ServiceTier::Flex);
        assert_eq!(ServiceTier::from_config("bogus"), ServiceTier::Flex);
    }

    #[test]
    fn test_fallback_is_the_complement() {
        assert_eq!(ServiceTier::Flex.fallback(), ServiceTier::Auto);
        assert_eq!(ServiceTier::Priority.fallback(), ServiceTier::Auto);
        assert_eq!(ServiceTier::Auto.fallback(), ServiceTier::Flex);
    }

    #[test]
    fn test_request_wire_shape() {
        let mut req = StructuredRequest::new(
            "be terse",
            "{\"resume\":\"...\"}",
            JsonSchemaSpec::new("analysis", json!({"type": "object"})),
        );
        req.request_id = Some("req-1".into());
        req.metadata.insert("endpoint".into(), "/api/analyze".into());

        let wire = serde_json::to_value(ResponsesRequest::build(&req, "gpt-5-nano", ServiceTier::Flex)).unwrap();
        assert_eq!(wire["model"], "gpt-5-nano");
        assert_eq!(wire["service_tier"], "flex");
        assert_eq!(wire["input"][0]["role"], "system");
        assert_eq!(wire["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(wire["input"][1]["content"][0]["text"], "{\"resume\":\"...\"}");
        assert_eq!(wire["text"]["format"]["type"], "json_schema");
        assert_eq!(wire["text"]["format"]["name"], "analysis");
        assert_eq!(wire["text"]["format"]["strict"], true);
        assert_eq!(wire["max_output_tokens"], 900);
        assert_eq!(wire["temperature"], 1.0);
        assert_eq!(wire["metadata"]["requestId"], "req-1");
        assert_eq!(wire["metadata"]["endpoint"], "/api/analyze");
        assert_eq!(wire["metadata"]["project"], "atsbuddy");
    }
}
