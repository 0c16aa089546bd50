//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **VoicemailError**: domain failures raised by the voicemail pipeline
//!   (record extraction, container decoding, transport, storage, integration calls).
//! - **AppError**: what an HTTP caller sees. Every `VoicemailError` converts into an
//!   `AppError`, which renders the JSON error body and picks the status code.
//!
//! ## Status Code Mapping:
//! - Malformed input (bad record, bad transcript, bad key) → 400
//! - Upstream collaborator failures (media, storage, integration, transcription) → 502
//! - Everything else → 500
//!
//! The status code matters for the trigger that delivered the event: a non-2xx
//! response is what hands the event back to the trigger's redelivery policy.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures raised while reconstructing, publishing or packaging a voicemail.
#[derive(Error, Debug)]
pub enum VoicemailError {
    /// The queue record could not be decoded or lacks required fields
    #[error("Record extraction failed: {0}")]
    Extraction(String),

    /// The media container stream is malformed
    #[error("Container decode failed at byte {offset}: {message}")]
    Demux { offset: u64, message: String },

    /// The remote media stream could not be reached or read
    #[error("Media stream error: {0}")]
    MediaStream(String),

    #[error("Object storage error for {bucket}/{key}: {message}")]
    Storage {
        bucket: String,
        key: String,
        message: String,
    },

    /// The transcript document does not have the expected shape
    #[error("Transcript parse failed: {0}")]
    Transcript(String),

    #[error("Integration call {method} failed: {message}")]
    Integration { method: String, message: String },

    #[error("Transcription service error: {0}")]
    Transcription(String),

    /// An object key does not follow the recordings/transcripts naming convention
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoicemailError {
    pub fn storage(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        VoicemailError::Storage {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn integration(method: &str, message: impl Into<String>) -> Self {
        VoicemailError::Integration {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Whether the failure came from an external collaborator rather than the input.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            VoicemailError::MediaStream(_)
                | VoicemailError::Storage { .. }
                | VoicemailError::Integration { .. }
                | VoicemailError::Transcription(_)
                | VoicemailError::Http(_)
        )
    }
}

pub type VoicemailResult<T> = Result<T, VoicemailError>;

/// Errors returned from HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: The trigger sent an event we cannot use (400 errors)
/// - **Upstream**: A collaborator (storage, media, CRM, transcription) failed (502 errors)
/// - **ConfigError**: Configuration problems (500 errors)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    Upstream(String),
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "upstream_error",
///     "message": "Object storage error for bucket/key: not found",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::Upstream(msg) => ("upstream_error", msg),
            AppError::ConfigError(msg) => ("config_error", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<VoicemailError> for AppError {
    fn from(err: VoicemailError) -> Self {
        match err {
            VoicemailError::Extraction(_)
            | VoicemailError::Transcript(_)
            | VoicemailError::InvalidKey(_)
            | VoicemailError::Json(_) => AppError::BadRequest(err.to_string()),
            ref e if e.is_upstream() => AppError::Upstream(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_demux_error_display() {
        let error = VoicemailError::Demux {
            offset: 42,
            message: "element id longer than 4 bytes".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Container decode failed at byte 42: element id longer than 4 bytes"
        );
    }

    #[test]
    fn test_storage_helper_display() {
        let error = VoicemailError::storage("vm-bucket", "voicemail_recordings/a.wav", "missing");
        assert_eq!(
            error.to_string(),
            "Object storage error for vm-bucket/voicemail_recordings/a.wav: missing"
        );
        assert!(error.is_upstream());
    }

    #[test]
    fn test_voicemail_error_status_mapping() {
        let bad: AppError = VoicemailError::Extraction("no data".to_string()).into();
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let upstream: AppError = VoicemailError::integration("executeOmniFlow", "timeout").into();
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);

        let io: AppError =
            VoicemailError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).into();
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VoicemailError>();
    }
}
