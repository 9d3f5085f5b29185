use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Rejection raised while classifying an uploaded file or request payload
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file exceeds the {limit_mb} MB size limit")]
    TooLarge { size: u64, limit_mb: u64 },

    #[error("could not determine the file type from its content")]
    UnknownType,

    #[error("unsupported {class} type: {detected}")]
    UnsupportedType { class: &'static str, detected: String },

    #[error("file extension \"{extension}\" does not match the detected type {detected}")]
    ExtensionMismatch { extension: String, detected: String },

    #[error("file content carries an embedded script signature")]
    ScriptSignature,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unexpected field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("a file is required when creating a new {0} entry")]
    FileRequired(&'static str),
}

impl ValidationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnknownType | Self::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Transfer-level failure reported by the HTTP layer before validation ran
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("upload exceeds the allowed request size")]
    SizeExceeded,

    #[error("upload was only partially received")]
    Partial,

    #[error("no temporary directory is available for uploads")]
    NoTempDir,

    #[error("failed to write the uploaded bytes to disk")]
    WriteFailed,

    #[error("upload blocked by the extension policy")]
    ExtensionBlocked,
}

/// Unified request failure for the ingestion endpoints
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Token missing, unknown, or already consumed
    #[error("invalid or already used CSRF token")]
    CsrfRejected,

    /// Anything that failed after the request itself was acceptable
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl MediaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(v) => v.status_code(),
            Self::Transport(TransportError::SizeExceeded) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transport(_) => StatusCode::BAD_REQUEST,
            Self::CsrfRejected => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal failures keep their chain in the logs and stay opaque on the wire
        let message = match &self {
            MediaError::Internal(e) => {
                error!(error = ?e, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_status_codes() {
        let too_large = ValidationError::TooLarge { size: 10, limit_mb: 5 };
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let bad_type = ValidationError::UnsupportedType {
            class: "image",
            detected: "image/gif".to_string(),
        };
        assert_eq!(bad_type.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        assert_eq!(
            ValidationError::MissingField("title").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_media_error_status_codes() {
        assert_eq!(
            MediaError::CsrfRejected.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MediaError::from(TransportError::SizeExceeded).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            MediaError::from(TransportError::Partial).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MediaError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
