//! HTTP and WebSocket surface for presentation clients.
//!
//! Endpoints:
//! - POST /api/chat - Send a prompt (`{"prompt": "..."}`)
//! - POST /api/chat/cancel - Cancel the in-flight response
//! - GET /api/messages - Conversation snapshot
//! - DELETE /api/messages - Clear the conversation
//! - GET /api/context - Resolved work item context
//! - PUT /api/context/{id} - Switch the active work item
//! - GET /api/status - Phase, provider and active item
//! - WS /ws - Conversation events as JSON

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::app::Sidekick;
use crate::chat::{ConversationSnapshot, SessionId, StreamPhase};
use crate::config::DeliveryMode;
use crate::error::Error;
use crate::workitems::WorkItemHierarchy;

type AppState = Arc<Sidekick>;

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatAccepted {
    pub session_id: SessionId,
    pub message_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContextParams {
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub work_item_id: Option<u64>,
    pub hierarchy: WorkItemHierarchy,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub phase: StreamPhase,
    pub provider: String,
    pub mode: DeliveryMode,
    pub language: String,
    pub work_item_id: Option<u64>,
}

// === Server Lifecycle ===

/// Routes with CORS enabled for browser-hosted panels.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/chat/cancel", post(cancel_chat))
        .route("/api/messages", get(get_messages).delete(clear_messages))
        .route("/api/context", get(get_context))
        .route("/api/context/{id}", put(put_context))
        .route("/api/status", get(get_status))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on 127.0.0.1 until Ctrl-C.
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!("Sidekick server listening on http://{addr}");
    tracing::info!(%addr, provider = state.orchestrator.transport_name(), "server started");

    let orchestrator = state.orchestrator.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            orchestrator.cancel().await;
            tracing::info!("shutting down");
        })
        .await
        .context("Server error")
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Busy => StatusCode::CONFLICT,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn post_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<(StatusCode, Json<ChatAccepted>), StatusCode> {
    let ticket = state.orchestrator.send(body.prompt).await.map_err(|e| {
        tracing::debug!(error = %e, "chat request rejected");
        status_for(&e)
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ChatAccepted {
            session_id: ticket.session_id,
            message_id: ticket.message_id,
        }),
    ))
}

async fn cancel_chat(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.orchestrator.cancel().await,
    })
}

async fn get_messages(State(state): State<AppState>) -> Json<ConversationSnapshot> {
    Json(state.orchestrator.snapshot().await)
}

async fn clear_messages(State(state): State<AppState>) -> StatusCode {
    match state.orchestrator.clear().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => status_for(&e),
    }
}

async fn get_context(
    State(state): State<AppState>,
    Query(params): Query<ContextParams>,
) -> Json<ContextResponse> {
    let language = params
        .language
        .unwrap_or_else(|| state.orchestrator.options().language.clone());
    let hierarchy = state.services.context.load().await;
    let prompt = hierarchy.prompt(&language);
    Json(ContextResponse {
        work_item_id: state.services.host.current().await,
        hierarchy,
        prompt,
    })
}

async fn put_context(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<WorkItemHierarchy> {
    Json(state.switch_work_item(id).await)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let options = state.orchestrator.options();
    Json(StatusResponse {
        phase: state.orchestrator.phase().await,
        provider: state.orchestrator.transport_name().to_string(),
        mode: options.mode,
        language: options.language.clone(),
        work_item_id: state.services.host.current().await,
    })
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.orchestrator.subscribe();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "websocket client lagging, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if socket.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    }
}
