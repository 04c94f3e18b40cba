//! Resume file → plain text.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

const MIME_PDF: &str = "application/pdf";
const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MIME_TEXT: &str = "text/plain";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    /// As sent by the client; inferred from the extension when absent.
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMeta {
    pub filename: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<usize>,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub meta: TextMeta,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type")]
    UnsupportedFileType,

    #[error("file exceeds the 8 MiB upload limit")]
    FileTooLarge,

    #[error("{0}")]
    Pdf(String),
}

pub async fn extract_text(file: UploadedFile) -> Result<ExtractedText, ExtractError> {
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ExtractError::FileTooLarge);
    }
    let filename = if file.name.is_empty() {
        "resume".to_string()
    } else {
        file.name.clone()
    };
    let mime_type = file
        .mime_type
        .filter(|m| !m.is_empty() && m != "application/octet-stream")
        .unwrap_or_else(|| infer_mime_from_name(&filename).to_string());

    let (raw, mime_type) = match mime_type.as_str() {
        MIME_PDF => {
            let bytes = file.bytes.clone();
            let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| ExtractError::Pdf(e.to_string()))?
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            (text, MIME_PDF.to_string())
        }
        // No DOCX reader available; surfaced as unsupported.
        MIME_DOCX => return Err(ExtractError::UnsupportedFileType),
        _ if mime_type == MIME_TEXT || filename.to_ascii_lowercase().ends_with(".txt") => (
            String::from_utf8_lossy(&file.bytes).into_owned(),
            MIME_TEXT.to_string(),
        ),
        _ => return Err(ExtractError::UnsupportedFileType),
    };

    let text = normalize_whitespace(&raw);
    Ok(ExtractedText {
        meta: TextMeta {
            filename,
            mime_type,
            num_pages: None,
            word_count: count_words(&text),
        },
        text,
    })
}

fn infer_mime_from_name(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        MIME_PDF
    } else if lower.ends_with(".docx") {
        MIME_DOCX
    } else if lower.ends_with(".txt") {
        MIME_TEXT
    } else {
        "application/octet-stream"
    }
}

/// CRLF/CR → LF, runs of tabs/NBSP → one space, 3+ newlines → 2, trimmed.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut newlines = 0usize;
    while let Some(c) = chars.next() {
        let c = if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            '\n'
        } else {
            c
        };
        match c {
            '\n' => {
                newlines += 1;
                if newlines <= 2 {
                    out.push('\n');
                }
            }
            '\t' | '\u{00A0}' => {
                newlines = 0;
                while matches!(chars.peek(), Some('\t' | '\u{00A0}')) {
                    chars.next();
                }
                out.push(' ');
            }
            other => {
                newlines = 0;
                out.push(other);
            }
        }
    }
    out.trim().to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
