//! # Error Handling
//!
//! This module defines the application error type and how each error maps to an
//! HTTP status and a client-facing message.
//!
//! ## Two layers of errors:
//! - [`ProviderError`](crate::providers::ProviderError): what went wrong talking to an
//!   external service (network, bad status, empty answer)
//! - [`AppError`]: what went wrong for the request, tagged with the processing stage
//!
//! Each pipeline step wraps provider failures into its own `AppError` variant, whose
//! message starts with a stage prefix ("Transcription failed: ..."). The error
//! handler middleware turns an `AppError` into the standard JSON error envelope.

use actix_web::http::StatusCode;
use thiserror::Error;

/// Stage prefixes carried by pipeline error messages.
pub const TRANSCRIPTION_FAILED: &str = "Transcription failed";
pub const EXTRACTION_FAILED: &str = "Medical extraction failed";
pub const DIAGNOSIS_FAILED: &str = "Diagnosis generation failed";

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **Transcription / Extraction / Diagnosis**: a pipeline step failed (500)
/// - **Validation**: the payload could not be used (400)
/// - **Internal**: anything else; classified by message (see [`classify_message`])
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::Validation("extractedInfo must be an object".to_string()));
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Medical extraction failed: {0}")]
    Extraction(String),

    #[error("Diagnosis generation failed: {0}")]
    Diagnosis(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and client-facing message for this error.
    ///
    /// Typed variants map directly. `Internal` errors carry no stage information in
    /// their type, so their message is inspected instead; an upstream error that was
    /// flattened into a string still lands on the right status this way.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Transcription(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Audio transcription failed")
            }
            AppError::Extraction(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Medical information extraction failed",
            ),
            AppError::Diagnosis(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Diagnosis generation failed")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation error"),
            AppError::Internal(msg) => classify_message(msg),
        }
    }
}

/// Classify an opaque error message by the phrases the pipeline stages use.
///
/// Messages that match none of the phrases fall through to a generic 500.
pub fn classify_message(message: &str) -> (StatusCode, &'static str) {
    if message.contains(TRANSCRIPTION_FAILED) {
        (StatusCode::INTERNAL_SERVER_ERROR, "Audio transcription failed")
    } else if message.contains(EXTRACTION_FAILED) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Medical information extraction failed",
        )
    } else if message.contains(DIAGNOSIS_FAILED) {
        (StatusCode::INTERNAL_SERVER_ERROR, "Diagnosis generation failed")
    } else if message.contains("validation") {
        (StatusCode::BAD_REQUEST, "Validation error")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

/// Payloads that decode as JSON but not into the expected shape are the
/// client's problem, so they become validation errors (400).
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("invalid request payload: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
