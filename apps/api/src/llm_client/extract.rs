//! Structured-output extraction.
//!
//! Model output is searched in a fixed order and the first hit wins:
//! a part tagged `output_json`, any part carrying parsed JSON, the whole
//! text parsed directly, the first balanced JSON block inside the text, and
//! finally the raw text wrapped as `{"message": text}`. Extraction never
//! fails.

use serde_json::{json, Value};

use super::response::NormalizedResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    OutputJson,
    PartJson,
    DirectText,
    ScannedText,
    RawMessage,
}

impl ExtractionSource {
    pub fn is_native_json(self) -> bool {
        matches!(self, ExtractionSource::OutputJson | ExtractionSource::PartJson)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub source: ExtractionSource,
    /// Length of the text that was parsed; zero for native JSON parts.
    pub text_length: usize,
}

pub fn extract_structured(response: &NormalizedResponse) -> Extracted {
    if let Some(value) = response
        .parts
        .iter()
        .find(|p| p.kind == "output_json")
        .and_then(|p| p.json.clone())
    {
        return native(value, ExtractionSource::OutputJson);
    }
    if let Some(value) = response
        .parts
        .iter()
        .filter_map(|p| p.json.as_ref())
        .find(|j| j.is_object())
    {
        return native(value.clone(), ExtractionSource::PartJson);
    }

    let text = response.text().unwrap_or_else(|| "{}".to_string());
    let text_length = text.len();
    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return Extracted {
            value,
            source: ExtractionSource::DirectText,
            text_length,
        };
    }
    if let Some(value) = extract_json_from_text(&text) {
        return Extracted {
            value,
            source: ExtractionSource::ScannedText,
            text_length,
        };
    }
    Extracted {
        value: json!({ "message": text }),
        source: ExtractionSource::RawMessage,
        text_length,
    }
}

fn native(value: Value, source: ExtractionSource) -> Extracted {
    Extracted {
        value,
        source,
        text_length: 0,
    }
}

/// Tries every `{` or `[` in order and returns the first balanced block
/// that parses.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| matches!(b, b'{' | b'['))
        .find_map(|(start, _)| {
            let end = balanced_end(bytes, start)?;
            serde_json::from_str(&text[start..=end]).ok()
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    Escaped,
}

/// Index of the bracket closing the one at `start`, ignoring brackets inside
/// string literals. `None` if the block never closes.
///
/// All delimiters are ASCII, so byte positions are valid char boundaries.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let open = bytes[start];
    let close = match open {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };
    let mut depth = 0usize;
    let mut state = ScanState::Normal;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        state = match state {
            ScanState::Escaped => ScanState::InString,
            ScanState::InString => match b {
                b'\\' => ScanState::Escaped,
                b'"' => ScanState::Normal,
                _ => ScanState::InString,
            },
            ScanState::Normal => {
                if b == b'"' {
                    ScanState::InString
                } else {
                    if b == open {
                        depth += 1;
                    } else if b == close {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    ScanState::Normal
                }
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::response::OutputPart;

    fn text_response(text: &str) -> NormalizedResponse {
        NormalizedResponse {
            output_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_prose_preamble_with_braces_in_strings() {
        let text = r#"Sure! Here is the result: {"message": "use {curly} and \"quoted }\" text", "n": {"x": [1, 2]}} hope this helps"#;
        let got = extract_json_from_text(text).unwrap();
        assert_eq!(got["message"], "use {curly} and \"quoted }\" text");
        assert_eq!(got["n"]["x"][1], 2);
    }

    #[test]
    fn test_skips_unparseable_candidates() {
        let text = "note {not json} then {\"ok\": true}";
        assert_eq!(extract_json_from_text(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_unterminated_string_yields_nothing() {
        assert_eq!(extract_json_from_text(r#"{"a": "never closed}"#), None);
    }

    #[test]
    fn test_array_candidate() {
        assert_eq!(extract_json_from_text("list: [1, [2, 3]] end"), Some(json!([1, [2, 3]])));
    }

    #[test]
    fn test_first_of_multiple_blocks_wins() {
        assert_eq!(
            extract_json_from_text(r#"{"first": 1} and {"second": 2}"#),
            Some(json!({"first": 1}))
        );
    }

    #[test]
    fn test_multibyte_text_around_json() {
        assert_eq!(
            extract_json_from_text("résumé → {\"naïve\": \"ü\"} ✓"),
            Some(json!({"naïve": "ü"}))
        );
    }

    #[test]
    fn test_tagged_json_part_wins() {
        let response = NormalizedResponse {
            parts: vec![
                OutputPart {
                    kind: "other".into(),
                    json: Some(json!({"b": 2})),
                    text: None,
                },
                OutputPart {
                    kind: "output_json".into(),
                    json: Some(json!({"a": 1})),
                    text: None,
                },
            ],
            output_text: Some("{\"c\": 3}".into()),
            ..Default::default()
        };
        let got = extract_structured(&response);
        assert_eq!(got.value, json!({"a": 1}));
        assert_eq!(got.source, ExtractionSource::OutputJson);
        assert_eq!(got.text_length, 0);
    }

    #[test]
    fn test_untagged_json_part() {
        let response = NormalizedResponse {
            parts: vec![OutputPart {
                kind: "output_text".into(),
                json: Some(json!({"b": 2})),
                text: Some("ignored".into()),
            }],
            ..Default::default()
        };
        assert_eq!(extract_structured(&response).source, ExtractionSource::PartJson);
    }

    #[test]
    fn test_direct_then_scanned_then_raw() {
        let direct = extract_structured(&text_response("{\"a\": 1}"));
        assert_eq!(direct.source, ExtractionSource::DirectText);

        let scanned = extract_structured(&text_response("```json\n{\"a\": 1}\n```"));
        assert_eq!(scanned.source, ExtractionSource::ScannedText);
        assert_eq!(scanned.value, json!({"a": 1}));

        let raw = extract_structured(&text_response("no json here"));
        assert_eq!(raw.source, ExtractionSource::RawMessage);
        assert_eq!(raw.value, json!({"message": "no json here"}));
        assert_eq!(raw.text_length, "no json here".len());
    }

    #[test]
    fn test_no_output_parses_as_empty_object() {
        let got = extract_structured(&NormalizedResponse::default());
        assert_eq!(got.value, json!({}));
    }
}
