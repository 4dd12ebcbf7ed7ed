//! Container-level handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::errors::AppError;
use crate::metrics::record_operation;
use crate::storage::backend::StoreError;
use crate::AppState;

/// `POST /createcon/{name}` -- create a storage container.
///
/// An already existing container counts as success, so the call is
/// idempotent.
#[utoipa::path(
    post,
    path = "/createcon/{name}",
    tag = "Container",
    operation_id = "CreateContainer",
    params(
        ("name" = String, Path, description = "Container name"),
    ),
    responses(
        (status = 200, description = "Container created or already present"),
        (status = 400, description = "Container could not be created")
    )
)]
pub async fn create_container(state: Arc<AppState>, name: &str) -> Result<Response, AppError> {
    let store = state.store().await;
    match store.create_container(name).await {
        Ok(()) => {
            record_operation("create_container", "ok");
            info!(container = %name, "Container created");
            Ok((StatusCode::OK, "Container created successfully").into_response())
        }
        Err(StoreError::ContainerAlreadyExists { .. }) => {
            record_operation("create_container", "exists");
            info!(container = %name, "Container already exists");
            Ok((StatusCode::OK, "Container already exists").into_response())
        }
        Err(e) => {
            record_operation("create_container", e.kind());
            Err(AppError::CreateContainer(e))
        }
    }
}
