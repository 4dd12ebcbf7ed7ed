//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].
//!
//! Each route accepts exactly one method.  Any other method gets a 400 with
//! the route's own mismatch message (OPTIONS gets a preflight response), and
//! unmatched paths fall through to `400 Invalid request path`.

use axum::{
    body::Bytes,
    extract::multipart::MultipartRejection,
    extract::rejection::{BytesRejection, PathRejection},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, AppError};
use crate::handlers::{admin, blob, container};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the test server.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "COSI Blob Test API",
        version = "0.1.0",
        description = "Test endpoints for a COSI-provisioned Azure Blob Storage bucket"
    ),
    paths(
        health_check,
        crate::handlers::blob::probe,
        crate::handlers::blob::get_blob,
        crate::handlers::blob::put_blob,
        crate::handlers::blob::get_container_blob,
        crate::handlers::blob::put_container_blob,
        crate::handlers::blob::upload_file,
        crate::handlers::container::create_container,
        crate::handlers::admin::refresh,
    ),
    components(schemas(crate::handlers::blob::RequestBody)),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Blob", description = "Blob upload and download"),
        (name = "Container", description = "Container lifecycle"),
        (name = "Admin", description = "Credential management"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(handle_probe).fallback(probe_only))
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/get/:name", get(handle_get_blob).fallback(download_only))
        .route(
            "/get/:container/:blob",
            get(handle_get_container_blob).fallback(download_only),
        )
        .route("/put/", post(handle_upload_file).fallback(upload_only))
        .route("/put/:name", post(handle_put_blob).fallback(upload_only))
        .route(
            "/put/:container/:blob",
            post(handle_put_container_blob).fallback(upload_only),
        )
        .route(
            "/createcon/:name",
            post(handle_create_container).fallback(create_container_only),
        )
        .route("/refresh", post(handle_refresh).fallback(refresh_only));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let cors = cors_layer(&state.config.server.cors_allow_origin);

    router
        .fallback(handle_unmatched)
        .with_state(state)
        // common_headers_middleware is inner (stamps every response).
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Uploads have no size limit.
                .layer(DefaultBodyLimit::disable()),
        )
}

// -- CORS ----------------------------------------------------------------------

/// CORS policy: GET/POST/OPTIONS with any request header, from the
/// configured origin (`*` for any).
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!("Ignoring invalid CORS origin '{}'", origin);
            layer
        }
    }
}

/// Response to a bare `OPTIONS` request. Real preflights (with `Origin` and
/// `Access-Control-Request-Method`) are answered by the CORS layer.
fn preflight_response() -> Response {
    (
        StatusCode::OK,
        [(header::ALLOW, "GET, POST, OPTIONS")],
    )
        .into_response()
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` headers to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert(header::DATE, value);
    }
    headers.insert(header::SERVER, HeaderValue::from_static("cosi-blob-app"));

    response
}

// -- Health check / docs ----------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json`
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Method mismatch / unmatched paths -------------------------------------------

fn method_mismatch(method: &Method, allowed: &'static str, operation: &'static str) -> Response {
    if method == Method::OPTIONS {
        return preflight_response();
    }
    AppError::MethodMismatch { allowed, operation }.into_response()
}

async fn probe_only(method: Method) -> Response {
    method_mismatch(&method, "GET", "the probe")
}

async fn download_only(method: Method) -> Response {
    method_mismatch(&method, "GET", "blob download")
}

async fn upload_only(method: Method) -> Response {
    method_mismatch(&method, "POST", "blob upload")
}

async fn create_container_only(method: Method) -> Response {
    method_mismatch(&method, "POST", "container creation")
}

async fn refresh_only(method: Method) -> Response {
    method_mismatch(&method, "POST", "credential refresh")
}

/// Router-level fallback for paths no route matches.
async fn handle_unmatched(method: Method) -> Response {
    if method == Method::OPTIONS {
        return preflight_response();
    }
    AppError::InvalidPath.into_response()
}

// -- Extractor rejections -----------------------------------------------------

/// Unwrap path parameters; a segment that does not decode (e.g. invalid
/// UTF-8) is an invalid path.
fn path_params<T>(path: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    path.map(|Path(params)| params)
        .map_err(|rejection| AppError::PathParam(rejection.body_text()))
}

fn request_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, AppError> {
    body.map_err(|rejection| AppError::BodyRead(rejection.body_text()))
}

// -- Route dispatch ------------------------------------------------------------

/// `GET /`
async fn handle_probe(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    blob::probe(state).await
}

/// `GET /get/:name`
async fn handle_get_blob(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let name = path_params(path)?;
    blob::get_blob(state, None, &name).await
}

/// `GET /get/:container/:blob`
async fn handle_get_container_blob(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Response, AppError> {
    let (container, name) = path_params(path)?;
    blob::get_container_blob(state, &container, &name).await
}

/// `POST /put/` (multipart)
async fn handle_upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let multipart = multipart.map_err(|rejection| AppError::Multipart(rejection.body_text()))?;
    blob::upload_file(state, multipart).await
}

/// `POST /put/:name`
async fn handle_put_blob(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let name = path_params(path)?;
    let body = request_body(body)?;
    blob::put_blob(state, None, &name, &body).await
}

/// `POST /put/:container/:blob`
async fn handle_put_container_blob(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let (container, name) = path_params(path)?;
    let body = request_body(body)?;
    blob::put_container_blob(state, &container, &name, &body).await
}

/// `POST /createcon/:name`
async fn handle_create_container(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let name = path_params(path)?;
    container::create_container(state, &name).await
}

/// `POST /refresh`
async fn handle_refresh(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    admin::refresh(state).await
}

// -- Tests -------------------------------------------------------------------
