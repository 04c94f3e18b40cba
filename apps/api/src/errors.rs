use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::extract_text::ExtractError;
use crate::llm_client::AiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported file type. Please upload a PDF or TXT resume.")]
    UnsupportedFileType,

    #[error("File too large. Please upload a file under 8MB.")]
    FileTooLarge,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("AI result degraded: {0}")]
    Degraded(String),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFileType => AppError::UnsupportedFileType,
            ExtractError::FileTooLarge => AppError::FileTooLarge,
            ExtractError::Pdf(msg) => AppError::Validation(format!("Could not read the PDF: {msg}")),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsupportedFileType | AppError::FileTooLarge => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Degraded(_) => StatusCode::BAD_GATEWAY,
            AppError::Ai(_) | AppError::NotConfigured(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Code and user-facing message. Provider and internal details stay in the log.
    fn public_parts(&self) -> (&'static str, String) {
        match self {
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::UnsupportedFileType => ("UNSUPPORTED_FILE_TYPE", self.to_string()),
            AppError::FileTooLarge => ("FILE_TOO_LARGE", self.to_string()),
            AppError::Unauthorized => ("UNAUTHORIZED", "Authentication required".to_string()),
            AppError::RateLimited { .. } => (
                "RATE_LIMITED",
                "Too many requests. Please try again shortly.".to_string(),
            ),
            AppError::Degraded(_) => (
                "AI_DEGRADED",
                "The AI service returned an incomplete result. Please try again.".to_string(),
            ),
            AppError::Ai(_) | AppError::Internal(_) => (
                "INTERNAL_ERROR",
                "An unexpected server error occurred".to_string(),
            ),
            AppError::NotConfigured(what) => ("NOT_CONFIGURED", format!("{what} is not configured")),
        }
    }

    /// Logs server-side failures. `request_id` attributes the line so it shows
    /// up in the request's own log view.
    fn log(&self, request_id: Option<&str>) {
        match self {
            AppError::Degraded(msg) => {
                tracing::warn!(request_id, "Degraded AI result: {msg}");
            }
            AppError::Ai(e) => {
                tracing::error!(request_id, "AI error: {e}");
            }
            AppError::NotConfigured(what) => {
                tracing::error!(request_id, "{what} is not configured");
            }
            AppError::Internal(e) => {
                tracing::error!(request_id, "Internal error: {e:?}");
            }
            _ => {}
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log(None);
        let status = self.status();
        let (code, message) = self.public_parts();
        let mut response = (
            status,
            Json(json!({
                "ok": false,
                "error": message,
                "code": code
            })),
        )
            .into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// An `AppError` raised while serving an analysis request. Carries the
/// request id into the body and the `x-request-id` header.
#[derive(Debug)]
pub struct RequestError {
    pub request_id: String,
    pub error: AppError,
}

impl RequestError {
    pub fn new(request_id: &str, error: impl Into<AppError>) -> Self {
        Self {
            request_id: request_id.to_string(),
            error: error.into(),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        self.error.log(Some(&self.request_id));
        let status = self.error.status();
        let (code, message) = self.error.public_parts();
        let mut response = (
            status,
            Json(json!({
                "ok": false,
                "requestId": self.request_id,
                "error": message,
                "code": code
            })),
        )
            .into_response();
        let headers = response.headers_mut();
        if let AppError::RateLimited { retry_after_secs } = self.error {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        if let Ok(v) = HeaderValue::from_str(&self.request_id) {
            headers.insert(REQUEST_ID_HEADER, v);
        }
        response
    }
}
