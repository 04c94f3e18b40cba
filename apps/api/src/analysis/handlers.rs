use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::analyzer::{analyze_resume, AnalysisInput};
use super::extract_text::{extract_text, UploadedFile};
use crate::errors::{AppError, RequestError, REQUEST_ID_HEADER};
use crate::rate_limit::client_key;
use crate::state::AppState;

/// Shorter resume text is treated as a user error.
pub const MIN_RESUME_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    pub resume_text: String,
    #[serde(default)]
    pub job_text: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// POST /api/analyze
///
/// Accepts `multipart/form-data` (`file`, `jobText`) or a JSON body
/// (`resumeText`, `jobText`, `meta`). Every response, success or error,
/// carries the request id.
pub async fn handle_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Result<([(HeaderName, HeaderValue); 1], Json<Value>), RequestError> {
    let request_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let client = client_key(&headers);
    if let Err(retry_after_secs) = state.rate_limiter.check(&client) {
        info!(request_id = %request_id, client = %client, "analyze.rate_limited");
        return Err(RequestError::new(
            &request_id,
            AppError::RateLimited { retry_after_secs },
        ));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    info!(request_id = %request_id, content_type = %content_type, "analyze.start");

    let result = run(&state, &content_type, request, &request_id).await;
    let latency_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(data) => {
            info!(request_id = %request_id, ok = true, latency_ms, "analyze.finish");
            let header_value = HeaderValue::from_str(&request_id)
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            Ok((
                [(HeaderName::from_static(REQUEST_ID_HEADER), header_value)],
                Json(json!({ "ok": true, "requestId": request_id, "data": data })),
            ))
        }
        Err(e) => {
            info!(
                request_id = %request_id,
                ok = false,
                latency_ms,
                status = e.status().as_u16(),
                error = %e,
                "analyze.finish"
            );
            Err(RequestError::new(&request_id, e))
        }
    }
}

async fn run(
    state: &AppState,
    content_type: &str,
    request: Request,
    request_id: &str,
) -> Result<Value, AppError> {
    let input = if content_type.starts_with("multipart/form-data") {
        read_multipart(state, request).await?
    } else {
        read_json(state, request).await?
    };

    if input.resume_text.chars().count() < MIN_RESUME_CHARS {
        return Err(AppError::Validation(
            "Resume text seems too short; upload a real resume.".to_string(),
        ));
    }
    analyze_resume(&state.ai, &input, request_id).await
}

async fn read_json(state: &AppState, request: Request) -> Result<AnalysisInput, AppError> {
    let Json(body) = Json::<AnalyzeBody>::from_request(request, state)
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(AnalysisInput {
        resume_text: body.resume_text,
        job_text: body.job_text.unwrap_or_default(),
        meta: body.meta.unwrap_or_else(|| json!({})),
    })
}

async fn read_multipart(state: &AppState, request: Request) -> Result<AnalysisInput, AppError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?;

    let mut file: Option<UploadedFile> = None;
    let mut job_text = String::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                file = Some(UploadedFile {
                    name,
                    mime_type,
                    bytes,
                });
            }
            Some("jobText") => {
                job_text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("Missing resume file".to_string()))?;
    let extracted = extract_text(file).await?;
    Ok(AnalysisInput {
        resume_text: extracted.text,
        job_text,
        meta: json!({
            "filename": extracted.meta.filename,
            "wordCount": extracted.meta.word_count,
        }),
    })
}
