//! REST API Server for the stock chat orchestrator
//!
//! Exposes sessions and turns over HTTP. A turn's view is streamed back
//! as Server-Sent Events: `partial` events carry the text so far, then a
//! single `final` event carries the rendered view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::generation::ViewUpdate;

/// Starter prompts offered to a fresh conversation
pub const SUGGESTIONS: [&str; 2] = [
    "Show me my previous trade history",
    "Get me current stock value of TSLA",
];

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_response(err: OrchestrationError) -> Response {
    let status = match &err {
        OrchestrationError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::TurnInProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }

    (status, Json(ApiResponse::error(err.to_string()))).into_response()
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn create_session(State(state): State<ApiState>) -> Response {
    match state.orchestrator.create_session().await {
        Ok(session_id) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(serde_json::json!({ "session_id": session_id }))),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_messages(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> Response {
    match state.orchestrator.conversation(session_id).await {
        Ok(conversation) => Json(ApiResponse::success(conversation)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn send_message(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message text must not be empty".into())),
        )
            .into_response();
    }

    info!(session_id = %session_id, "Received message");

    let handle = match state.orchestrator.send_message(session_id, &req.text).await {
        Ok(handle) => handle,
        Err(e) => return error_response(e),
    };

    // Dropping the stream (client disconnect) drops the handle and cancels the turn.
    let events = handle.into_stream().map(|update| match update {
        ViewUpdate::Partial { text } => Event::default()
            .event("partial")
            .json_data(serde_json::json!({ "text": text })),
        ViewUpdate::Final { view } => Event::default().event("final").json_data(view),
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn suggestions() -> Json<ApiResponse> {
    Json(ApiResponse::success(SUGGESTIONS))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Orchestrator) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:session_id/messages",
            get(get_messages).post(send_message),
        )
        .route("/api/suggestions", get(suggestions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Orchestrator,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
