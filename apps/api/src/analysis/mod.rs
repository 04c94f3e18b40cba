//! Resume analysis: upload handling, text extraction, and the structured
//! AI call with its output quality check.

pub mod analyzer;
pub mod extract_text;
pub mod handlers;
pub mod prompts;
