use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use super::prompts::{analysis_schema, ANALYSIS_SCHEMA_NAME, ANALYSIS_SYSTEM_PROMPT};
use crate::errors::AppError;
use crate::llm_client::{AiManager, JsonSchemaSpec, StructuredRequest};

pub const ANALYZE_ENDPOINT: &str = "/api/analyze";
const MAX_QUALITY_ATTEMPTS: u32 = 3;
const QUALITY_BACKOFF: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub resume_text: String,
    pub job_text: String,
    /// Client-supplied extras (filename, word count).
    pub meta: Value,
}

/// First required field that is missing or empty.
///
/// `score` must be a number, `rewriteBullets` a non-empty array, and the
/// two prose fields non-blank strings.
pub fn missing_quality_field(result: &Value) -> Option<&'static str> {
    if !result.get("score").is_some_and(Value::is_number) {
        return Some("score");
    }
    if !result
        .get("rewriteBullets")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty())
    {
        return Some("rewriteBullets");
    }
    ["atsAudit", "coverLetterTemplate"].into_iter().find(|field| {
        !result
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    })
}

/// Runs the analysis, re-asking the model while the result lacks a required
/// field. Provider failures are not retried here.
pub async fn analyze_resume(
    ai: &AiManager,
    input: &AnalysisInput,
    request_id: &str,
) -> Result<Value, AppError> {
    let user = json!({
        "resume": input.resume_text,
        "job": if input.job_text.trim().is_empty() { Value::Null } else { json!(input.job_text) },
        "meta": input.meta,
    })
    .to_string();

    let mut last_missing = "";
    for attempt in 1..=MAX_QUALITY_ATTEMPTS {
        let mut req = StructuredRequest::new(
            ANALYSIS_SYSTEM_PROMPT,
            user.clone(),
            JsonSchemaSpec::new(ANALYSIS_SCHEMA_NAME, analysis_schema()),
        );
        req.request_id = Some(request_id.to_string());
        req.metadata
            .insert("endpoint".to_string(), ANALYZE_ENDPOINT.to_string());

        let result = ai.create_json_response(req).await?;
        let Some(missing) = missing_quality_field(&result) else {
            return Ok(result);
        };
        last_missing = missing;
        warn!(
            request_id,
            attempt,
            missing_field = missing,
            "analyze.quality_retry"
        );
        if attempt < MAX_QUALITY_ATTEMPTS {
            tokio::time::sleep(QUALITY_BACKOFF * attempt).await;
        }
    }

    Err(AppError::Degraded(format!(
        "'{last_missing}' still empty after {MAX_QUALITY_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::retry::tests::FakeApi;
    use crate::llm_client::{RetryPolicy, ServiceTier};
    use crate::metrics::MetricsStore;
    use crate::storage::InMemoryListStore;

    pub(crate) fn complete_analysis() -> Value {
        json!({
            "score": 78,
            "highlights": ["Led migration to Rust"],
            "missingKeywords": ["Kubernetes"],
            "rewriteBullets": ["Cut p99 latency 40% by rewriting the ingest path in Rust"],
            "atsAudit": "Single column, standard headings; no parse risks.",
            "coverLetterTemplate": "Dear Hiring Manager, ...",
            "generalGuidance": "Quantify impact in every bullet.",
            "message": "Strong backend profile."
        })
    }

    /// Wraps an analysis in a Responses API payload.
    pub(crate) fn reply(analysis: Value) -> Value {
        json!({
            "id": "resp_test",
            "output": [{"type": "message", "content": [{"type": "output_json", "json": analysis}]}],
            "usage": {"input_tokens": 900, "output_tokens": 300}
        })
    }

    fn manager(api: Arc<FakeApi>) -> (AiManager, MetricsStore) {
        let metrics = MetricsStore::new(Arc::new(InMemoryListStore::new()), "m", 100);
        let ai = AiManager::new(api, metrics.clone(), "gpt-5-nano", ServiceTier::Flex, RetryPolicy::default());
        (ai, metrics)
    }

    fn input() -> AnalysisInput {
        AnalysisInput {
            resume_text: "Jane Doe. Senior engineer with ten years building distributed systems.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_quality_field() {
        assert_eq!(missing_quality_field(&complete_analysis()), None);

        let mut v = complete_analysis();
        v["score"] = json!("high");
        assert_eq!(missing_quality_field(&v), Some("score"));

        let mut v = complete_analysis();
        v["rewriteBullets"] = json!([]);
        assert_eq!(missing_quality_field(&v), Some("rewriteBullets"));

        let mut v = complete_analysis();
        v["coverLetterTemplate"] = json!("   ");
        assert_eq!(missing_quality_field(&v), Some("coverLetterTemplate"));

        assert_eq!(missing_quality_field(&json!({"message": "raw"})), Some("score"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_complete_result_is_returned() {
        let api = FakeApi::new(vec![], reply(complete_analysis()));
        let (ai, _) = manager(api.clone());
        let got = analyze_resume(&ai, &input(), "req-1").await.unwrap();
        assert_eq!(got, complete_analysis());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_result_is_retried() {
        let mut partial = complete_analysis();
        partial["atsAudit"] = json!("");
        let api = FakeApi::new(vec![Ok(reply(partial))], reply(complete_analysis()));
        let (ai, metrics) = manager(api.clone());

        let got = analyze_resume(&ai, &input(), "req-2").await.unwrap();
        assert_eq!(got["atsAudit"], complete_analysis()["atsAudit"]);
        assert_eq!(api.calls(), 2);
        // Each answered call is metered.
        metrics.flush().await;
        assert_eq!(metrics.recent().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistently_incomplete_result_is_degraded() {
        let api = FakeApi::new(vec![], reply(json!({"message": "I cannot help"})));
        let (ai, _) = manager(api.clone());
        let err = analyze_resume(&ai, &input(), "req-3").await.unwrap_err();
        assert!(matches!(err, AppError::Degraded(_)));
        assert_eq!(api.calls(), 3);
    }
}
