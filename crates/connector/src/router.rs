//! HTTP router for the connector.
//!
//! Every request walks the same path: the credential gate (middleware), route
//! matching, body parsing, path authorization, the filesystem operation on a
//! blocking thread, and finally an [`Envelope`] response.
//!
//! | Method  | Pattern                  | Route                        |
//! |---------|--------------------------|------------------------------|
//! | GET     | `/connector`             | [`RouteKind::Capabilities`]  |
//! | GET     | `/connector/version`     | [`RouteKind::Version`]       |
//! | GET     | `/connector/files`       | [`RouteKind::ListRoot`]      |
//! | GET     | `/connector/files/*path` | [`RouteKind::Get`]           |
//! | PUT     | `/connector/files/*path` | [`RouteKind::Write`]         |
//! | POST    | `/connector/files/*path` | [`RouteKind::Create`]        |
//! | OPTIONS | `/connector` and below   | [`RouteKind::Preflight`]     |
//!
//! Anything else is answered with a `"Bad request"` failure envelope.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{BytesRejection, PathRejection},
        DefaultBodyLimit, Path, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use protocol::{CreateRequest, Envelope, WriteRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::CredentialGate;
use crate::error::{ConnectorError, ConnectorResult};
use crate::files::{FileService, Resource};

/// Content type of every envelope response.
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Body sent when an envelope cannot be encoded.
const ENCODE_FAILURE_BODY: &[u8] = br#"{"status":"failure","data":"Bad request"}"#;

/// The operations a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Document naming the other endpoints.
    Capabilities,
    /// Server name and version.
    Version,
    /// Listing of the sandbox root.
    ListRoot,
    /// Listing of a directory or content of a file.
    Get,
    /// Overwrite of an existing file.
    Write,
    /// Creation of a new file.
    Create,
    /// CORS preflight.
    Preflight,
}

impl RouteKind {
    /// URL pattern. Preflight answers this prefix and everything below it.
    pub fn pattern(self) -> &'static str {
        match self {
            RouteKind::Capabilities => "/connector",
            RouteKind::Version => "/connector/version",
            RouteKind::ListRoot => "/connector/files",
            RouteKind::Get | RouteKind::Write | RouteKind::Create => "/connector/files/*path",
            RouteKind::Preflight => "/connector",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteKind::Capabilities => "capabilities",
            RouteKind::Version => "version",
            RouteKind::ListRoot => "list_root",
            RouteKind::Get => "get",
            RouteKind::Write => "write",
            RouteKind::Create => "create",
            RouteKind::Preflight => "preflight",
        };
        f.write_str(name)
    }
}

/// Per-deployment values the handlers need besides the file service.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Base for capability URLs; `http://{Host}` is used when unset.
    pub public_url: Option<String>,
    /// Value of `Access-Control-Allow-Origin`.
    pub allowed_origin: HeaderValue,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            public_url: None,
            allowed_origin: HeaderValue::from_static("*"),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Filesystem operations confined to the sandbox.
    pub service: Arc<FileService>,
    /// The credential check.
    pub gate: Arc<CredentialGate>,
    /// Deployment settings.
    pub settings: Arc<RouterSettings>,
}

/// Document returned by `GET /connector`.
#[derive(Debug, Serialize)]
struct Capabilities {
    version: String,
    files: String,
}

/// Builds the axum `Router` with all connector routes.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.max_body_bytes;

    Router::new()
        .route(
            RouteKind::Capabilities.pattern(),
            get(capabilities).options(preflight).fallback(invalid_route),
        )
        .route(
            RouteKind::Version.pattern(),
            get(version).options(preflight).fallback(invalid_route),
        )
        .route(
            RouteKind::ListRoot.pattern(),
            get(list_root).options(preflight).fallback(invalid_route),
        )
        .route(
            RouteKind::Get.pattern(),
            get(get_path)
                .put(write_path)
                .post(create_path)
                .options(preflight)
                .fallback(invalid_route),
        )
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_credential))
        .layer(middleware::from_fn_with_state(state.clone(), apply_cors))
        .with_state(state)
}

// ============================================================================
// Middleware
// ============================================================================

async fn require_credential(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS && is_connector_path(request.uri().path()) {
        return next.run(request).await;
    }

    match state.gate.validate_headers(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                reason = %e,
                "Rejected unauthenticated request"
            );
            let mut response = ConnectorError::from(e).into_response();
            if let Ok(challenge) = HeaderValue::from_str(state.gate.challenge()) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
            response
        }
    }
}

async fn apply_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        state.settings.allowed_origin.clone(),
    );
    response
}

fn is_connector_path(path: &str) -> bool {
    let prefix = RouteKind::Preflight.pattern();
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let base = match &state.settings.public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{}", host)
        }
    };
    debug!(route = %RouteKind::Capabilities, base = %base, "Serving capabilities");

    success(Capabilities {
        version: format!("{}{}", base, RouteKind::Version.pattern()),
        files: format!("{}{}", base, RouteKind::ListRoot.pattern()),
    })
}

async fn version() -> Response {
    debug!(route = %RouteKind::Version, "Serving version");
    success(crate::version_string())
}

async fn list_root(State(state): State<AppState>) -> Result<Response, ConnectorError> {
    debug!(route = %RouteKind::ListRoot, "Listing sandbox root");
    let service = state.service.clone();
    let entries = run_blocking(move || {
        let root = service.guard().authorize_root();
        service.list(&root)
    })
    .await?;
    Ok(success(entries))
}

async fn get_path(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, ConnectorError> {
    let requested = requested_path(path)?;
    debug!(route = %RouteKind::Get, path = %requested, "Reading path");

    let service = state.service.clone();
    let resource = run_blocking(move || service.get(&requested)).await?;
    Ok(match resource {
        Resource::Listing(entries) => success(entries),
        Resource::File(record) => success(record),
    })
}

async fn write_path(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ConnectorError> {
    let requested = requested_path(path)?;
    let request = WriteRequest::from_json(&request_body(body)?)?;
    debug!(route = %RouteKind::Write, path = %requested, "Writing file");

    let service = state.service.clone();
    let record = run_blocking(move || {
        let target = service.guard().authorize(&requested)?;
        service.write(&target, &requested, &request)
    })
    .await?;
    Ok(success(record))
}

async fn create_path(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ConnectorError> {
    let requested = requested_path(path)?;
    let request = CreateRequest::from_json(&request_body(body)?)?;
    debug!(route = %RouteKind::Create, path = %requested, "Creating file");

    let service = state.service.clone();
    let record = run_blocking(move || {
        let target = service.guard().authorize_new(&requested)?;
        service.create(&target, &request)
    })
    .await?;
    Ok(success(record))
}

async fn preflight(request: Request) -> Response {
    debug!(route = %RouteKind::Preflight, path = %request.uri().path(), "Answering preflight");
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                "GET, PUT, POST, OPTIONS",
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Authorization, Content-Type",
            ),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
        .into_response()
}

async fn invalid_route(method: Method, request: Request) -> Response {
    debug!(method = %method, path = %request.uri().path(), "No route for request");
    ConnectorError::InvalidRoute.into_response()
}

async fn fallback(method: Method, request: Request) -> Response {
    if method == Method::OPTIONS && is_connector_path(request.uri().path()) {
        return preflight(request).await;
    }
    invalid_route(method, request).await
}

// ============================================================================
// Helpers
// ============================================================================

fn requested_path(path: Result<Path<String>, PathRejection>) -> ConnectorResult<String> {
    match path {
        Ok(Path(path)) => Ok(path),
        Err(rejection) => Err(ConnectorError::BadRequest(rejection.body_text())),
    }
}

fn request_body(body: Result<Bytes, BytesRejection>) -> ConnectorResult<Bytes> {
    body.map_err(|rejection| ConnectorError::BadRequest(rejection.body_text()))
}

/// Run filesystem work off the async workers.
async fn run_blocking<T, F>(work: F) -> ConnectorResult<T>
where
    F: FnOnce() -> ConnectorResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Filesystem task failed");
            Err(ConnectorError::NotFound("filesystem task failed".to_string()))
        }
    }
}

fn success<T: Serialize>(data: T) -> Response {
    envelope_response(StatusCode::OK, &Envelope::success(data))
}

fn envelope_response<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Response {
    match envelope.to_json() {
        Ok(body) => (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode envelope");
            (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
                ENCODE_FAILURE_BODY,
            )
                .into_response()
        }
    }
}

impl IntoResponse for ConnectorError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        if !matches!(self, ConnectorError::Unauthorized | ConnectorError::InvalidRoute) {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        envelope_response(status, &self.to_envelope())
    }
}
