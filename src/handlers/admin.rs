//! Operational handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::AppState;

/// `POST /refresh` -- re-read the bucket info secret and rebuild the client.
#[utoipa::path(
    post,
    path = "/refresh",
    tag = "Admin",
    operation_id = "RefreshCredentials",
    responses(
        (status = 200, description = "Credentials refreshed"),
        (status = 400, description = "Secret could not be reloaded; previous client kept")
    )
)]
pub async fn refresh(state: Arc<AppState>) -> Result<Response, AppError> {
    state.refresh().await.map_err(AppError::Refresh)?;
    Ok((StatusCode::OK, "Credentials refreshed").into_response())
}
