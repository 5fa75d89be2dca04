//! ==============================================================================
//! routes.rs - http api, dashboard and websocket live channel
//! ==============================================================================
//!
//! endpoints:
//!
//! ```text
//!     POST /api/sensor-data            device ingress
//!     GET  /api/sensor-data            history (?timeRange=1h|3h|6h|all&limit=N)
//!     GET  /api/sensor-data/latest     most recent reading (404 before the first)
//!     GET  /api/sensor-data/export     csv/json download (?format=&timeRange=)
//!     GET  /api/status                 device connectivity
//!     GET  /api/health                 liveness + uptime
//!     GET  /ws                         live channel
//!     GET  /                           dashboard, or live channel on upgrade
//!     *                                404 {error, path}
//! ```
//!
//! every handler returns `Result<_, RelayError>`; the error type decides the
//! status code and body. a panicking handler is turned into a 500 by
//! CatchPanicLayer, so no request can take the process down.
//!
//! ==============================================================================

use crate::config::CorsConfig;
use crate::domain::{Reading, TimeRange};
use crate::error::{RelayError, Result};
use crate::export::ExportFormat;
use crate::ingest::SensorSubmission;
use crate::service::SharedRelay;

use axum::{
    async_trait,
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequest, OriginalUri, Query, Request, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

// ==============================================================================
// shared state
// ==============================================================================

#[derive(Clone)]
pub struct AppState {
    pub relay: SharedRelay,
    /// dashboard html, rendered once at startup
    pub dashboard: Arc<str>,
}

pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    // a known path with the wrong method falls through to the same 404 as an
    // unknown path
    Router::new()
        .route("/", get(root_handler).fallback(not_found_handler))
        .route("/ws", get(ws_handler).fallback(not_found_handler))
        .route("/api/health", get(health_handler).fallback(not_found_handler))
        .route("/api/status", get(status_handler).fallback(not_found_handler))
        .route(
            "/api/sensor-data",
            get(history_handler)
                .post(ingest_handler)
                .fallback(not_found_handler),
        )
        .route("/api/sensor-data/latest", get(latest_handler).fallback(not_found_handler))
        .route("/api/sensor-data/export", get(export_handler).fallback(not_found_handler))
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors))
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("[CONFIG] Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// ==============================================================================
// response bodies
// ==============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    success: bool,
    message: &'static str,
    data: Reading,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatestResponse {
    success: bool,
    data: Reading,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    success: bool,
    data: Vec<Reading>,
    count: usize,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    success: bool,
    connected: bool,
    last_update: Option<DateTime<Utc>>,
    total_readings: usize,
    uptime: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    uptime: f64,
    last_update: Option<DateTime<Utc>>,
}

// ==============================================================================
// query parameters
// ==============================================================================
// kept as raw strings so a bad value becomes our own 400 body rather than
// axum's plain-text rejection.

#[derive(Deserialize, Default)]
struct HistoryParams {
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
    limit: Option<String>,
}

#[derive(Deserialize, Default)]
struct ExportParams {
    format: Option<String>,
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
}

fn parse_range(raw: Option<&str>) -> Result<TimeRange> {
    match raw.map(str::trim) {
        None | Some("") => Ok(TimeRange::All),
        Some(s) => s.parse().map_err(RelayError::Validation),
    }
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RelayError::Validation(format!("invalid limit '{}' (expected a non-negative integer)", s))),
    }
}

fn query_params<T: Default>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| RelayError::Validation(e.body_text()))
}

// ==============================================================================
// ingress body
// ==============================================================================
// firmware posts either json or an html-style form. form fields are all
// strings, which ingest already coerces.

struct SubmissionBody(SensorSubmission);

#[async_trait]
impl<S> FromRequest<S> for SubmissionBody
where
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.trim_start().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let submission = if is_form {
            let Form(submission) = Form::<SensorSubmission>::from_request(req, state)
                .await
                .map_err(|e| invalid_body(e.body_text()))?;
            submission
        } else {
            let Json(submission) = Json::<SensorSubmission>::from_request(req, state)
                .await
                .map_err(|e| invalid_body(e.body_text()))?;
            submission
        };

        Ok(Self(submission))
    }
}

fn invalid_body(detail: String) -> RelayError {
    tracing::warn!("[INGEST] Rejected body: {}", detail);
    RelayError::Validation(format!("Invalid request body: {}", detail))
}

// ==============================================================================
// handlers
// ==============================================================================

async fn ingest_handler(
    State(state): State<AppState>,
    SubmissionBody(submission): SubmissionBody,
) -> Result<Json<IngestResponse>> {
    let reading = state.relay.ingest(submission).await.map_err(|e| {
        if let RelayError::Validation(msg) = &e {
            tracing::warn!("[INGEST] Rejected submission: {}", msg);
        }
        e
    })?;

    Ok(Json(IngestResponse {
        success: true,
        message: "Data received successfully",
        data: reading,
    }))
}

async fn latest_handler(State(state): State<AppState>) -> Result<Json<LatestResponse>> {
    let snapshot = state.relay.latest().await?;
    Ok(Json(LatestResponse {
        success: true,
        data: snapshot.reading,
        last_update: snapshot.last_update,
    }))
}

async fn history_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>> {
    let params = query_params(params)?;
    let range = parse_range(params.time_range.as_deref())?;
    let limit = parse_limit(params.limit.as_deref())?;

    let snapshot = state.relay.history(range, limit).await;
    Ok(Json(HistoryResponse {
        success: true,
        count: snapshot.readings.len(),
        data: snapshot.readings,
        last_update: snapshot.last_update,
    }))
}

async fn export_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response> {
    let params = query_params(params)?;
    let format = match params.format.as_deref().map(str::trim) {
        None | Some("") => ExportFormat::default(),
        Some(s) => s.parse::<ExportFormat>().map_err(RelayError::Validation)?,
    };
    let range = parse_range(params.time_range.as_deref())?;

    let snapshot = state.relay.history(range, None).await;
    if snapshot.readings.is_empty() {
        return Err(RelayError::NotFound("No data available to export".to_string()));
    }

    let body = format.render(&snapshot.readings)?;
    let disposition = format!("attachment; filename=\"{}\"", format.file_name(state.relay.now()));

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.relay.status().await;
    Json(StatusResponse {
        success: true,
        connected: status.connectivity.connected,
        last_update: status.connectivity.last_update,
        total_readings: status.connectivity.total_readings,
        uptime: status.uptime_secs,
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.relay.health().await;
    Json(HealthResponse {
        status: "OK",
        timestamp: health.timestamp,
        uptime: health.uptime_secs,
        last_update: health.last_update,
    })
}

/// dashboard for browsers, live channel for websocket clients
async fn root_handler(ws: Option<WebSocketUpgrade>, State(state): State<AppState>) -> Response {
    match ws {
        Some(ws) => ws.on_upgrade(move |socket| live_session(socket, state.relay)),
        None => Html(state.dashboard.to_string()).into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| live_session(socket, state.relay))
}

async fn not_found_handler(OriginalUri(uri): OriginalUri) -> (StatusCode, Json<serde_json::Value>) {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found", "path": path })),
    )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    RelayError::Internal(anyhow::anyhow!(message)).into_response()
}

// ==============================================================================
// live channel
// ==============================================================================
// one task per connected viewer. the task owns the subscription and is the
// only place that unsubscribes it, whichever side closes first.

async fn live_session(socket: WebSocket, relay: SharedRelay) {
    let mut subscription = relay.subscribe().await;
    let id = subscription.id;
    tracing::info!("[WS] Viewer {} connected", id);

    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            pushed = subscription.inbox.recv() => {
                let Some(message) = pushed else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("[WS] Failed to encode live message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = outgoing.send(Message::Text(text)).await {
                    tracing::debug!("[WS] Viewer {} send failed: {}", id, e);
                    break;
                }
            }
            received = incoming.next() => match received {
                Some(Ok(Message::Close(_))) | None => break,
                // viewers have nothing to say; pings are answered by axum
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("[WS] Viewer {} receive error: {}", id, e);
                    break;
                }
            },
        }
    }

    relay.unsubscribe(id).await;
    tracing::info!("[WS] Viewer {} disconnected", id);
}
