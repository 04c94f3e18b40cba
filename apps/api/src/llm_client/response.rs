//! Canonical view of a Responses API payload.
//!
//! Providers and SDK versions disagree on nesting (`response.output` vs
//! `output`) and on usage field names. Everything downstream reads
//! `NormalizedResponse` only.

use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    /// Subset of `input_tokens`.
    pub cached_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Explicit total if reported, else input + output when both are known.
    pub fn total(&self) -> Option<u64> {
        self.total_tokens.or(match (self.input_tokens, self.output_tokens) {
            (Some(i), Some(o)) => Some(i + o),
            _ => None,
        })
    }
}

/// One content part of one output item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputPart {
    /// Value of the part's `type` field, e.g. `output_text` or `output_json`.
    pub kind: String,
    pub json: Option<Value>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub parts: Vec<OutputPart>,
    /// Top-level aggregated text, when the provider supplies one.
    pub output_text: Option<String>,
    pub usage: Usage,
}

impl NormalizedResponse {
    pub fn from_value(raw: &Value) -> Self {
        let nested = raw.get("response");
        let pick = |field: &str| raw.get(field).or_else(|| nested.and_then(|n| n.get(field)));

        let parts = pick("output")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("content").and_then(Value::as_array))
                    .flatten()
                    .map(normalize_part)
                    .collect()
            })
            .unwrap_or_default();

        let output_text = pick("output_text")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                // Messages-style payloads: `content[0].text`.
                raw.pointer("/content/0/text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        Self {
            id: pick("id").and_then(Value::as_str).map(str::to_string),
            model: pick("model").and_then(Value::as_str).map(str::to_string),
            parts,
            output_text,
            usage: pick("usage").map(normalize_usage).unwrap_or_default(),
        }
    }

    /// The aggregated top-level text, or every text part joined by newlines.
    pub fn text(&self) -> Option<String> {
        if let Some(text) = &self.output_text {
            return Some(text.clone());
        }
        let pieces: Vec<&str> = self.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if pieces.is_empty() {
            None
        } else {
            Some(pieces.join("\n"))
        }
    }
}

fn normalize_part(part: &Value) -> OutputPart {
    OutputPart {
        kind: part
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        json: part.get("json").filter(|j| !j.is_null()).cloned(),
        text: part.get("text").and_then(Value::as_str).map(str::to_string),
    }
}

fn normalize_usage(usage: &Value) -> Usage {
    let first = |paths: &[&str]| paths.iter().find_map(|p| usage.pointer(p).and_then(Value::as_u64));
    Usage {
        input_tokens: first(&["/input_tokens", "/inputTokens", "/prompt_tokens"]),
        cached_input_tokens: first(&[
            "/input_tokens_details/cached_tokens",
            "/inputTokensDetails/cachedTokens",
            "/cached_input_tokens",
            "/cachedInputTokens",
            "/input_cached_tokens",
        ]),
        output_tokens: first(&["/output_tokens", "/outputTokens", "/completion_tokens"]),
        total_tokens: first(&["/total_tokens", "/totalTokens"]),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_documented_shape() {
        let raw = json!({
            "id": "resp_1",
            "model": "gpt-5-nano-2025-08-07",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"a\":1}"}
                ]}
            ],
            "usage": {
                "input_tokens": 120,
                "input_tokens_details": {"cached_tokens": 20},
                "output_tokens": 30,
                "total_tokens": 150
            }
        });
        let r = NormalizedResponse::from_value(&raw);
        assert_eq!(r.id.as_deref(), Some("resp_1"));
        assert_eq!(r.parts.len(), 1);
        assert_eq!(r.parts[0].kind, "output_text");
        assert_eq!(r.text().as_deref(), Some("{\"a\":1}"));
        assert_eq!(
            r.usage,
            Usage {
                input_tokens: Some(120),
                cached_input_tokens: Some(20),
                output_tokens: Some(30),
                total_tokens: Some(150),
            }
        );
    }

    #[test]
    fn test_nested_response_and_camel_case_usage() {
        let raw = json!({
            "response": {
                "id": "resp_2",
                "output": [{"content": [{"type": "output_json", "json": {"score": 80}}]}],
                "usage": {"inputTokens": 10, "outputTokens": 5, "cachedInputTokens": 2}
            }
        });
        let r = NormalizedResponse::from_value(&raw);
        assert_eq!(r.id.as_deref(), Some("resp_2"));
        assert_eq!(r.parts[0].json, Some(json!({"score": 80})));
        assert_eq!(r.usage.cached_input_tokens, Some(2));
        assert_eq!(r.usage.total_tokens, None);
        assert_eq!(r.usage.total(), Some(15));
    }

    #[test]
    fn test_output_text_takes_precedence_over_parts() {
        let raw = json!({
            "output_text": "aggregated",
            "output": [{"content": [{"type": "output_text", "text": "part"}]}]
        });
        assert_eq!(NormalizedResponse::from_value(&raw).text().as_deref(), Some("aggregated"));
    }

    #[test]
    fn test_parts_are_joined() {
        let raw = json!({
            "output": [
                {"content": [{"type": "output_text", "text": "one"}]},
                {"content": [{"type": "output_text", "text": "two"}]}
            ]
        });
        assert_eq!(NormalizedResponse::from_value(&raw).text().as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn test_messages_style_content() {
        let raw = json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(NormalizedResponse::from_value(&raw).text().as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_payload() {
        let r = NormalizedResponse::from_value(&json!({}));
        assert!(r.parts.is_empty());
        assert_eq!(r.text(), None);
        assert_eq!(r.usage.total(), None);
    }
}
