//! HTTP + WebSocket server for the GestureFlow UI.
//!
//! This module provides an HTTP server that:
//! - Streams per-frame recognition status over `GET /ws`, one session per socket
//! - Manages gesture → action mappings via `/api/gestures`
//! - Reports or resets classifier contents via `/api/model`
//!
//! # Architecture
//!
//! ```text
//! UI ──ws──▶ /ws ──▶ session loop ──▶ camera feed ──▶ classifier ──▶ desktop actions
//!  │                     │
//!  └──REST──▶ /api/* ────┴──▶ shared state (model, mappings)
//! ```

use crate::actions::GestureConfigEntry;
use crate::core::classifier::ModelStats;
use crate::session::{self, outbox};
use crate::state::{AppState, MappingError};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

/// Commands buffered per socket before new ones are dropped.
const COMMAND_QUEUE: usize = 16;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Response from the gesture mutation endpoints
#[derive(Serialize)]
pub struct GestureResponse {
    pub status: String,
    pub gesture: String,
}

/// GET /api/gestures response
#[derive(Serialize)]
pub struct GestureList {
    pub gestures: Vec<GestureConfigEntry>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/gestures
async fn list_gestures(State(state): State<Arc<AppState>>) -> Json<GestureList> {
    Json(GestureList {
        gestures: state.list_gestures(),
    })
}

/// POST /api/gestures
///
/// Adds or replaces a mapping and rebuilds the live action map.
async fn upsert_gesture(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<GestureConfigEntry>,
) -> Result<Json<GestureResponse>, ApiError> {
    let name = entry.name.clone();
    state.upsert_gesture(entry).map_err(|e| match e {
        MappingError::InvalidAction(_) => api_error(StatusCode::BAD_REQUEST, "INVALID_ACTION", e),
        MappingError::Store(_) => {
            tracing::error!("Failed to persist gesture '{}': {}", name, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e)
        }
    })?;

    Ok(Json(GestureResponse {
        status: "ok".to_string(),
        gesture: name,
    }))
}

/// DELETE /api/gestures/:name
async fn delete_gesture(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<GestureResponse>, ApiError> {
    let found = state.delete_gesture(&name).map_err(|e| {
        tracing::error!("Failed to delete gesture '{}': {}", name, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e)
    })?;

    Ok(Json(GestureResponse {
        status: if found { "ok" } else { "not_found" }.to_string(),
        gesture: name,
    }))
}

/// GET /api/model
async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelStats> {
    Json(state.model_stats().await)
}

/// DELETE /api/model
///
/// Drops every sample from the live classifier and persists the empty model.
async fn reset_model(State(state): State<Arc<AppState>>) -> Result<Json<ModelStats>, ApiError> {
    state.reset_model().await.map_err(|e| {
        tracing::error!("Failed to reset model: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "MODEL_ERROR", e)
    })?;
    tracing::info!("Model reset");
    Ok(Json(state.model_stats().await))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump one socket: client text goes to the session as commands, session
/// events go back as JSON text. Closing either side ends the session.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (command_tx, command_rx) = mpsc::channel::<String>(COMMAND_QUEUE);
    let (event_tx, mut event_rx) = outbox::channel();
    let session = tokio::spawn(session::run_session(state, command_rx, event_tx));

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if command_tx.try_send(text).is_err() {
                        tracing::debug!("Command queue full, dropping client message");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("WebSocket receive error: {}", e);
                    break;
                }
            },
            event = event_rx.recv() => match event {
                Some(event) => {
                    if socket.send(Message::Text(event.to_json())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    session.abort();
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/gestures", get(list_gestures).post(upsert_gesture))
        .route("/api/gestures/:name", delete(delete_gesture))
        .route("/api/model", get(model_info).delete(reset_model))
        .route("/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let app = router(state);

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("GestureFlow server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
