//! Inbound webhook server.
//!
//! The gateway POSTs message payloads to `/webhook`; parsed messages are
//! queued onto an mpsc channel consumed by the router loop.

use crate::channel::whatsapp::WhatsAppGateway;
use crate::channel::ChannelMessage;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;

/// Webhook payloads are small; anything bigger is misdirected traffic.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared webhook state.
pub struct WebhookState {
    tx: mpsc::Sender<ChannelMessage>,
}

/// Create the webhook state and the receiving end of the message queue.
pub fn create_state(queue_depth: usize) -> (Arc<WebhookState>, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(queue_depth);
    (Arc::new(WebhookState { tx }), rx)
}

/// Build the webhook router.
pub fn build_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_webhook(
    State(state): State<Arc<WebhookState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let messages = WhatsAppGateway::parse_webhook_payload(&payload);
    for message in messages {
        if state.tx.send(message).await.is_err() {
            tracing::error!("message queue closed, dropping inbound message");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}
