//! HTTP-facing error type.
//!
//! Every failure collapses to `400 Bad Request` with a fixed, human-readable
//! plain-text body.  The underlying cause is logged, never returned to the
//! client.  Handlers simply return `Err(AppError::...)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use crate::storage::backend::StoreError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// No route matches the request path.
    #[error("Invalid request path")]
    InvalidPath,

    /// A path parameter could not be decoded.
    #[error("Invalid request path")]
    PathParam(String),

    /// The route exists but does not accept this method.
    #[error("Only {allowed} method is supported for {operation}")]
    MethodMismatch {
        allowed: &'static str,
        operation: &'static str,
    },

    /// The upload body is not a valid `{"data": ...}` document.
    #[error("Invalid request body")]
    InvalidBody(#[source] serde_json::Error),

    /// The request body could not be read.
    #[error("Invalid request body")]
    BodyRead(String),

    /// The multipart form could not be read.
    #[error("Invalid multipart form")]
    Multipart(String),

    /// The multipart form has no `file` field.
    #[error("Missing form field 'file'")]
    MissingFile,

    /// Blob download failed.
    #[error("Failed to download blob")]
    Download(#[source] StoreError),

    /// Blob upload failed.
    #[error("Failed to upload blob")]
    Upload(#[source] StoreError),

    /// Container creation failed for a reason other than "already exists".
    #[error("Failed to create container")]
    CreateContainer(#[source] StoreError),

    /// Re-reading the bucket info secret failed.
    #[error("Failed to refresh credentials")]
    Refresh(#[source] anyhow::Error),
}

impl AppError {
    /// HTTP status for this error. Every failure class maps to 400.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn cause(&self) -> Option<String> {
        match self {
            AppError::InvalidBody(e) => Some(e.to_string()),
            AppError::PathParam(e) | AppError::BodyRead(e) | AppError::Multipart(e) => {
                Some(e.clone())
            }
            AppError::Download(e) | AppError::Upload(e) | AppError::CreateContainer(e) => {
                Some(match e {
                    StoreError::Backend(inner) => format!("{:#}", inner),
                    other => other.to_string(),
                })
            }
            AppError::Refresh(e) => Some(format!("{:#}", e)),
            AppError::InvalidPath | AppError::MethodMismatch { .. } | AppError::MissingFile => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.cause() {
            Some(cause) => warn!(error = %self, cause = %cause, "Request failed"),
            None => warn!(error = %self, "Request rejected"),
        }

        (
            self.status_code(),
            [("content-type", "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_messages_are_fixed() {
        assert_eq!(AppError::InvalidPath.to_string(), "Invalid request path");
        assert_eq!(
            AppError::MethodMismatch {
                allowed: "GET",
                operation: "blob download"
            }
            .to_string(),
            "Only GET method is supported for blob download"
        );
        let store_err = StoreError::BlobNotFound {
            container: "c".to_string(),
            blob: "secret-name".to_string(),
        };
        assert_eq!(AppError::Download(store_err).to_string(), "Failed to download blob");
    }

    #[test]
    fn test_rejections_use_fixed_messages() {
        let err = AppError::PathParam("Invalid UTF-8 in `name`".to_string());
        assert_eq!(err.to_string(), "Invalid request path");
        assert_eq!(err.cause().as_deref(), Some("Invalid UTF-8 in `name`"));
        assert_eq!(
            AppError::BodyRead("stream closed".to_string()).to_string(),
            "Invalid request body"
        );
    }

    #[test]
    fn test_every_error_is_bad_request() {
        let errors = vec![
            AppError::InvalidPath,
            AppError::MissingFile,
            AppError::Upload(StoreError::NoDefaultContainer),
            AppError::CreateContainer(StoreError::AccessDenied {
                message: "x".to_string(),
            }),
            AppError::Refresh(anyhow::anyhow!("boom")),
        ];
        for err in errors {
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }
}
