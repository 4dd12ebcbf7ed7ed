//! Blob-level handlers: JSON upload/download, multipart upload, and the
//! root probe.

use std::sync::Arc;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::metrics::{record_operation, BYTES_DOWNLOADED_TOTAL, BYTES_UPLOADED_TOTAL};
use crate::AppState;

/// Multipart form field carrying the uploaded file.
const FILE_FIELD: &str = "file";

// -- Request body -------------------------------------------------------------

/// `{"data": "..."}` envelope shared by uploads and download responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RequestBody {
    /// Blob contents as a string.
    #[serde(default)]
    pub data: String,
}

#[derive(Deserialize)]
struct LenientRequestBody {
    #[serde(default)]
    data: String,
}

/// Decode an upload body. With `strict`, fields other than `data` are
/// rejected.
pub fn decode_request_body(raw: &[u8], strict: bool) -> Result<RequestBody, serde_json::Error> {
    if strict {
        serde_json::from_slice(raw)
    } else {
        serde_json::from_slice::<LenientRequestBody>(raw).map(|b| RequestBody { data: b.data })
    }
}

// -- Download -------------------------------------------------------------------

/// Read a whole blob into memory.
async fn download(
    state: &AppState,
    container: Option<&str>,
    name: &str,
) -> Result<Bytes, AppError> {
    let store = state.store().await;
    match store.get_blob(container, name).await {
        Ok(data) => {
            record_operation("download", "ok");
            counter!(BYTES_DOWNLOADED_TOTAL).increment(data.len() as u64);
            info!(container = ?container, blob = %name, bytes = data.len(), "Blob downloaded");
            Ok(data)
        }
        Err(e) => {
            record_operation("download", e.kind());
            Err(AppError::Download(e))
        }
    }
}

/// `GET /get/{name}` -- return the blob wrapped as `{"data": ...}`.
///
/// Invalid UTF-8 is replaced with U+FFFD.
#[utoipa::path(
    get,
    path = "/get/{name}",
    tag = "Blob",
    operation_id = "GetBlob",
    params(
        ("name" = String, Path, description = "Blob name in the default container"),
    ),
    responses(
        (status = 200, description = "Blob contents", body = RequestBody),
        (status = 400, description = "Blob could not be read")
    )
)]
pub async fn get_blob(
    state: Arc<AppState>,
    container: Option<&str>,
    name: &str,
) -> Result<Response, AppError> {
    let data = download(&state, container, name).await?;
    let body = RequestBody {
        data: String::from_utf8_lossy(&data).into_owned(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// `GET /get/{container}/{blob}` -- like [`get_blob`], in a named container.
#[utoipa::path(
    get,
    path = "/get/{container}/{blob}",
    tag = "Blob",
    operation_id = "GetContainerBlob",
    params(
        ("container" = String, Path, description = "Container name"),
        ("blob" = String, Path, description = "Blob name"),
    ),
    responses(
        (status = 200, description = "Blob contents", body = RequestBody),
        (status = 400, description = "Blob could not be read")
    )
)]
pub async fn get_container_blob(
    state: Arc<AppState>,
    container: &str,
    blob: &str,
) -> Result<Response, AppError> {
    get_blob(state, Some(container), blob).await
}

/// `GET /` -- download the configured probe blob from the default container.
#[utoipa::path(
    get,
    path = "/",
    tag = "Blob",
    operation_id = "Probe",
    responses(
        (status = 200, description = "Probe blob contents as plain text"),
        (status = 400, description = "Probe blob could not be read")
    )
)]
pub async fn probe(state: Arc<AppState>) -> Result<Response, AppError> {
    let data = download(&state, None, &state.config.api.probe_blob).await?;
    let body = format!("Cosi test web app: {}", String::from_utf8_lossy(&data));
    Ok((StatusCode::OK, body).into_response())
}

// -- Upload ---------------------------------------------------------------------

async fn upload(
    state: &AppState,
    container: Option<&str>,
    name: &str,
    data: Bytes,
) -> Result<Response, AppError> {
    let len = data.len();
    let store = state.store().await;
    match store.put_blob(container, name, data).await {
        Ok(()) => {
            record_operation("upload", "ok");
            counter!(BYTES_UPLOADED_TOTAL).increment(len as u64);
            info!(container = ?container, blob = %name, bytes = len, "Blob uploaded");
            Ok((StatusCode::OK, "Upload successful").into_response())
        }
        Err(e) => {
            record_operation("upload", e.kind());
            Err(AppError::Upload(e))
        }
    }
}

/// `POST /put/{name}` -- store the `data` string of a `{"data": ...}`
/// body as a block blob.
#[utoipa::path(
    post,
    path = "/put/{name}",
    tag = "Blob",
    operation_id = "PutBlob",
    params(
        ("name" = String, Path, description = "Blob name in the default container"),
    ),
    request_body = RequestBody,
    responses(
        (status = 200, description = "Upload successful"),
        (status = 400, description = "Invalid body or upload failure")
    )
)]
pub async fn put_blob(
    state: Arc<AppState>,
    container: Option<&str>,
    name: &str,
    body: &[u8],
) -> Result<Response, AppError> {
    let request =
        decode_request_body(body, state.config.api.strict_body).map_err(AppError::InvalidBody)?;
    upload(&state, container, name, Bytes::from(request.data)).await
}

/// `POST /put/{container}/{blob}` -- like [`put_blob`], in a named container.
#[utoipa::path(
    post,
    path = "/put/{container}/{blob}",
    tag = "Blob",
    operation_id = "PutContainerBlob",
    params(
        ("container" = String, Path, description = "Container name"),
        ("blob" = String, Path, description = "Blob name"),
    ),
    request_body = RequestBody,
    responses(
        (status = 200, description = "Upload successful"),
        (status = 400, description = "Invalid body or upload failure")
    )
)]
pub async fn put_container_blob(
    state: Arc<AppState>,
    container: &str,
    blob: &str,
    body: &[u8],
) -> Result<Response, AppError> {
    put_blob(state, Some(container), blob, body).await
}

/// `POST /put/` -- store the multipart `file` field as a block blob named
/// after the uploaded file.
#[utoipa::path(
    post,
    path = "/put/",
    tag = "Blob",
    operation_id = "UploadFile",
    responses(
        (status = 200, description = "Upload successful"),
        (status = 400, description = "Missing file field or upload failure")
    )
)]
pub async fn upload_file(
    state: Arc<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(FILE_FIELD)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Multipart(e.to_string()))?;

        return upload(&state, None, &name, data).await;
    }

    Err(AppError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strict_accepts_data_only() {
        let body = decode_request_body(br#"{"data":"hello"}"#, true).unwrap();
        assert_eq!(body.data, "hello");
    }

    #[test]
    fn test_decode_strict_rejects_unknown_field() {
        assert!(decode_request_body(br#"{"data":"hello","extra":1}"#, true).is_err());
    }

    #[test]
    fn test_decode_lenient_ignores_unknown_field() {
        let body = decode_request_body(br#"{"data":"hello","extra":1}"#, false).unwrap();
        assert_eq!(body.data, "hello");
    }

    #[test]
    fn test_decode_missing_data_is_empty() {
        assert_eq!(decode_request_body(b"{}", true).unwrap().data, "");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode_request_body(b"data=hello", false).is_err());
        assert!(decode_request_body(br#"{"data": 5}"#, true).is_err());
    }

    #[test]
    fn test_response_envelope_shape() {
        let body = RequestBody {
            data: "payload".to_string(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"data":"payload"}"#);
    }
}
