//! Operator REST API

use crate::coordinator::{SessionHandle, SessionStatus};
use crate::database::Database;
use crate::models::ScopeConfig;
use crate::queue::{MethodFilter, QueueFilter};
use crate::scope::ScopeEngine;
use crate::session::SessionNotification;
use crate::WorkbenchError;
use attack_engine::{
    AttackError, AttackMode, AttackProgress, AttackResultData, AttackStatistics, IntruderEngine, Repeater,
    RepeaterError,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::{stream, Stream};
use proxy_common::{Headers, InterceptedRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub database: Database,
    pub repeater: Repeater,
    pub intruder: IntruderEngine,
}

/// Error body returned by every handler as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<WorkbenchError> for ApiError {
    fn from(err: WorkbenchError) -> Self {
        let status = match &err {
            WorkbenchError::UnknownRequest { .. } => StatusCode::NOT_FOUND,
            WorkbenchError::Parse(_) | WorkbenchError::Configuration { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err)
    }
}

impl From<AttackError> for ApiError {
    fn from(err: AttackError) -> Self {
        let status = match &err {
            AttackError::Validation { .. } | AttackError::Parse(_) => StatusCode::BAD_REQUEST,
            AttackError::AlreadyRunning => StatusCode::CONFLICT,
            AttackError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err)
    }
}

impl From<RepeaterError> for ApiError {
    fn from(err: RepeaterError) -> Self {
        let status = match &err {
            RepeaterError::Parse(_) => StatusCode::BAD_REQUEST,
            RepeaterError::Dispatch(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Query parameters for the queue view
#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub q: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub requests: Vec<InterceptedRequest>,
    pub total_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForwardRequest {
    /// Operator-edited raw request text
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub raw: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub id: Option<String>,
}

impl ActionResponse {
    fn ok(id: Option<String>) -> Json<Self> {
        Json(Self { success: true, id })
    }
}

#[derive(Debug, Deserialize)]
pub struct RepeaterRequest {
    pub raw: String,
}

#[derive(Debug, Serialize)]
pub struct RepeaterResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: String,
    /// Formatted response text
    pub raw: String,
}

#[derive(Debug, Deserialize)]
pub struct IntruderStartRequest {
    pub template: String,
    pub payloads: Vec<String>,
    #[serde(default)]
    pub mode: AttackMode,
}

#[derive(Debug, Serialize)]
pub struct IntruderStartResponse {
    pub started: bool,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct IntruderStopResponse {
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct IntruderResultsResponse {
    pub results: Vec<AttackResultData>,
    pub statistics: AttackStatistics,
}

/// Build the operator API router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Intercept session
        .route("/api/intercept/queue", get(queue_handler))
        .route("/api/intercept/status", get(status_handler))
        .route("/api/intercept/events", get(events_handler))
        .route("/api/intercept/toggle", post(toggle_handler))
        .route("/api/intercept/:id/select", post(select_handler))
        .route("/api/intercept/:id/forward", post(forward_handler))
        .route("/api/intercept/:id/drop", post(drop_handler))
        .route("/api/intercept/:id/remove", post(remove_handler))
        // Scope
        .route("/api/scope", get(get_scope_handler).put(put_scope_handler))
        // Repeater
        .route("/api/repeater/send", post(repeater_send_handler))
        // Intruder
        .route("/api/intruder/start", post(intruder_start_handler))
        .route("/api/intruder/stop", post(intruder_stop_handler))
        .route("/api/intruder/results", get(intruder_results_handler))
        .route("/api/intruder/progress", get(intruder_progress_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn queue_handler(State(state): State<AppState>, Query(query): Query<QueueQuery>) -> ApiResult<QueueResponse> {
    let filter = QueueFilter::new(query.q.unwrap_or_default(), MethodFilter::parse(query.method.as_deref()));
    let requests = state.session.queue(filter).await?;
    Ok(Json(QueueResponse {
        total_count: requests.len(),
        requests,
    }))
}

async fn status_handler(State(state): State<AppState>) -> ApiResult<SessionStatus> {
    Ok(Json(state.session.status().await?))
}

/// Session notifications as server-sent events; lagging subscribers skip
/// what they missed
async fn events_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.session.subscribe();
    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => return Some((Ok(notification_event(&notification)), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn notification_event(notification: &SessionNotification) -> Event {
    match Event::default().json_data(notification) {
        Ok(event) => event,
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

async fn toggle_handler(State(state): State<AppState>, Json(body): Json<ToggleRequest>) -> ApiResult<ActionResponse> {
    state.session.toggle_intercept(body.enabled).await?;
    Ok(ActionResponse::ok(None))
}

async fn select_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SelectResponse> {
    let raw = state.session.select(&id).await?;
    Ok(Json(SelectResponse { raw }))
}

async fn forward_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<ActionResponse> {
    // An empty body forwards the request unchanged, whatever the content type
    let modified = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<ForwardRequest>(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid forward body: {}", e)))?
            .modified
    };
    state.session.forward(&id, modified).await?;
    crate::log_intercept_action!(info, id, "forward");
    Ok(ActionResponse::ok(Some(id)))
}

async fn drop_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ActionResponse> {
    state.session.drop_request(&id).await?;
    crate::log_intercept_action!(info, id, "drop");
    Ok(ActionResponse::ok(Some(id)))
}

async fn remove_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ActionResponse> {
    state.session.remove(&id).await?;
    crate::log_intercept_action!(info, id, "remove");
    Ok(ActionResponse::ok(Some(id)))
}

async fn get_scope_handler(State(state): State<AppState>) -> ApiResult<ScopeConfig> {
    Ok(Json(state.database.load_scope().await?.unwrap_or_default()))
}

/// Persist the record, then apply it to future admissions
async fn put_scope_handler(State(state): State<AppState>, Json(config): Json<ScopeConfig>) -> ApiResult<ScopeConfig> {
    ScopeEngine::new(config.clone())?;
    state.database.save_scope(&config).await?;
    state.session.set_scope(config.clone()).await?;
    Ok(Json(config))
}

async fn repeater_send_handler(
    State(state): State<AppState>,
    Json(body): Json<RepeaterRequest>,
) -> ApiResult<RepeaterResponse> {
    let response = state.repeater.send_raw(&body.raw).await?;
    let raw = response.to_message().format();
    Ok(Json(RepeaterResponse {
        status_code: response.status_code,
        headers: response.headers,
        body: response.body,
        raw,
    }))
}

async fn intruder_start_handler(
    State(state): State<AppState>,
    Json(body): Json<IntruderStartRequest>,
) -> ApiResult<IntruderStartResponse> {
    let total = body.payloads.len();
    // The sweep runs detached; progress and results are polled
    state.intruder.start(&body.template, body.payloads, body.mode).await?;
    info!(total, mode = ?body.mode, "Intruder attack started from API");
    Ok(Json(IntruderStartResponse { started: true, total }))
}

async fn intruder_stop_handler(State(state): State<AppState>) -> Json<IntruderStopResponse> {
    Json(IntruderStopResponse {
        stopped: state.intruder.stop().await,
    })
}

async fn intruder_results_handler(State(state): State<AppState>) -> Json<IntruderResultsResponse> {
    let results = state.intruder.results().await;
    let statistics = AttackStatistics::from_results(&results);
    Json(IntruderResultsResponse { results, statistics })
}

async fn intruder_progress_handler(State(state): State<AppState>) -> Json<AttackProgress> {
    Json(state.intruder.progress())
}
