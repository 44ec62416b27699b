//! Application API
//!
//! ## Endpoints
//! - GET `/` - index of applications (HTML)
//! - GET `/app?name=<app>` - redirect to `/app/<app>`
//! - GET `/app/{name}` - application state
//! - POST `/app/{name}/create_canary` - spawn a canary (`tag`, `replicas`)
//! - GET `/app/{name}/set_canary?enabled=<bool>` - split or pin traffic
//!
//! State responses are `AppState` JSON, or the rendered HTML fragment when
//! the request comes from htmx (`HX-Request: true`).

use crate::app::labels::{is_valid_label_value, parse_bool};
use crate::app::{
    list_applications, project_state, set_canary_traffic, spawn_canary, AppError, AppState,
    Context,
};
use crate::gateway::GatewayError;
use crate::server::metrics::SharedMetrics;
use crate::server::shutdown::ShutdownSignal;
use crate::server::views::{render_app, render_index};
use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{de, Deserialize, Deserializer};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const HX_REQUEST: &str = "HX-Request";

#[derive(Clone)]
pub struct ApiState {
    ctx: Arc<Context>,
    metrics: SharedMetrics,
    shutdown: ShutdownSignal,
}

impl ApiState {
    pub fn new(ctx: Arc<Context>, metrics: SharedMetrics, shutdown: ShutdownSignal) -> Self {
        ApiState {
            ctx,
            metrics,
            shutdown,
        }
    }
}

/// Error response: `{"error": "..."}` with a status derived from the error kind
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::InvalidTag | AppError::InvalidName(_) => StatusCode::BAD_REQUEST,
        AppError::MalformedWorkload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Gateway(GatewayError::Conflict { .. }) => StatusCode::CONFLICT,
        AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
        AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Body of a canary creation request, form-encoded or JSON
#[derive(Debug, Deserialize, PartialEq)]
pub struct CanaryRequest {
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_replicas", deserialize_with = "replicas_or_default")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

/// Accept a JSON number or a form string; a blank form field means the default
fn replicas_or_default<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) if text.trim().is_empty() => Ok(default_replicas()),
        Raw::Text(text) => text.trim().parse().map_err(de::Error::custom),
    }
}

impl<S> FromRequest<S> for CanaryRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<CanaryRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(body)
        } else {
            let Form(body) = Form::<CanaryRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(body)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetCanaryQuery {
    enabled: Option<String>,
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bool)
        .unwrap_or(false)
}

fn respond(headers: &HeaderMap, name: &str, state: AppState) -> Response {
    if wants_html(headers) {
        render_app(name, &state).into_response()
    } else {
        Json(state).into_response()
    }
}

/// Log and record the outcome of one core operation
fn observe<T>(
    state: &ApiState,
    operation: &'static str,
    app: &str,
    started: Instant,
    result: &Result<T, AppError>,
) {
    let elapsed = started.elapsed();
    match result {
        Ok(_) => {
            state.metrics.record_success(operation, elapsed.as_secs_f64());
            info!(
                operation = operation,
                app = %app,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request served"
            );
        }
        Err(e) => {
            state.metrics.record_error(operation, elapsed.as_secs_f64());
            warn!(
                operation = operation,
                app = %app,
                error = %e,
                status = status_for(e).as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request failed"
            );
        }
    }
}

async fn index(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let cancel = state.shutdown.request_token();

    let result = list_applications(&state.ctx, &cancel).await;
    observe(&state, "list_applications", "*", started, &result);

    Ok(render_index(&result?).into_response())
}

/// Redirect the index form to the application page
///
/// Only label values are forwarded, so the name is always a safe path segment.
async fn lookup(Query(query): Query<LookupQuery>) -> Result<Redirect, ApiError> {
    match query.name.as_deref().map(str::trim) {
        None | Some("") => Ok(Redirect::to("/")),
        Some(name) if is_valid_label_value(name) => Ok(Redirect::to(&format!("/app/{}", name))),
        Some(name) => Err(AppError::InvalidName(name.to_string()).into()),
    }
}

async fn get_app(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let cancel = state.shutdown.request_token();

    let result = project_state(&state.ctx, &name, &cancel).await;
    observe(&state, "get_state", &name, started, &result);

    Ok(respond(&headers, &name, result?))
}

async fn create_canary(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: CanaryRequest,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let cancel = state.shutdown.request_token();

    let result = async {
        spawn_canary(&state.ctx, &name, &body.tag, body.replicas, &cancel).await?;
        project_state(&state.ctx, &name, &cancel).await
    }
    .await;
    observe(&state, "create_canary", &name, started, &result);

    Ok(respond(&headers, &name, result?))
}

async fn set_canary(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<SetCanaryQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let cancel = state.shutdown.request_token();
    let enabled = query
        .enabled
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(false);

    let result = set_canary_traffic(&state.ctx, &name, enabled, &cancel).await;
    observe(&state, "set_canary", &name, started, &result);

    Ok(respond(&headers, &name, result?))
}

/// Build the router for the application API
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/app", get(lookup))
        .route("/app/{name}", get(get_app))
        .route("/app/{name}/create_canary", post(create_canary))
        .route("/app/{name}/set_canary", get(set_canary))
        .with_state(state)
}
