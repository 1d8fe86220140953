use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use sudsline_config::AssistantEntry;
use sudsline_session::{CallOutcome, CallSessionManager, StartCallRequest};

/// Shared application state for API handlers.
pub struct AppState {
    pub manager: CallSessionManager,
    pub assistants: Vec<AssistantEntry>,
}

impl AppState {
    /// Fill in the display name from config when the caller only sent an id.
    fn resolve_assistant(&self, mut request: StartCallRequest) -> StartCallRequest {
        if request.assistant_name.trim().is_empty() {
            if let Some(entry) = self.assistants.iter().find(|a| a.id == request.assistant_id) {
                request.assistant_name = entry.name.clone();
            }
        }
        request
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/calls/status", get(call_status))
        .route("/api/calls/start", post(start_call))
        .route("/api/calls/stop", post(stop_call))
        .route("/api/calls/logs", delete(clear_logs))
        .route("/api/calls/history", delete(clear_history))
        .route("/api/assistants", get(list_assistants))
        .route("/api/phone/validate", get(validate_phone))
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// HTTP status for an outcome, keyed on its error code.
fn outcome_status(outcome: &CallOutcome) -> StatusCode {
    if outcome.success {
        return StatusCode::OK;
    }
    match outcome.error.as_deref() {
        Some("already_in_progress") | Some("no_active_call") => StatusCode::CONFLICT,
        Some("invalid_phone_number") | Some("missing_phone_number") => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Some("vendor_init") | Some("vendor_call") => StatusCode::BAD_GATEWAY,
        Some("start_cancelled") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn outcome_response(outcome: CallOutcome) -> (StatusCode, Json<CallOutcome>) {
    (outcome_status(&outcome), Json(outcome))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sudsline",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    logs: Option<usize>,
    history: Option<usize>,
}

async fn call_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
) -> impl IntoResponse {
    let settings = state.manager.settings();
    let snapshot = state
        .manager
        .status_with_limits(
            params.logs.unwrap_or(settings.status_log_lines),
            params.history.unwrap_or(settings.status_history_records),
        )
        .await;
    Json(snapshot)
}

async fn start_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartCallRequest>,
) -> impl IntoResponse {
    let request = state.resolve_assistant(request);
    info!(assistant_id = %request.assistant_id, call_type = %request.call_type, "Start call requested");
    outcome_response(state.manager.start_call(request).await)
}

#[derive(Debug, Default, Deserialize)]
struct StopRequest {
    reason: Option<String>,
}

async fn stop_call(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    // An empty body is a plain operator stop.
    let request = if body.is_empty() {
        StopRequest::default()
    } else {
        match serde_json::from_slice::<StopRequest>(&body) {
            Ok(r) => r,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "success": false, "message": format!("Invalid stop request: {}", e) })),
                )
                    .into_response();
            }
        }
    };
    outcome_response(state.manager.stop_call(request.reason.as_deref()).await).into_response()
}

async fn clear_logs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    outcome_response(state.manager.clear_logs().await)
}

async fn clear_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    outcome_response(state.manager.clear_history().await)
}

async fn list_assistants(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "assistants": state.assistants }))
}

#[derive(Debug, Deserialize)]
struct ValidateParams {
    number: String,
}

async fn validate_phone(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> impl IntoResponse {
    Json(state.manager.phone_validator().parse(&params.number))
}

/// WebSocket stream of call events.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut stream = BroadcastStream::new(state.manager.subscribe());
    debug!("Event stream client connected");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(event) => {
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event stream client lagged");
            }
        }
    }
    debug!("Event stream client disconnected");
}
