//! Route configuration and handlers.

use crate::event::Inbound;
use crate::runner::NodeStatus;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use pbft_types::{PrePrepareMsg, ReplyMsg, RequestMsg, VoteMsg};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

/// Shared handler state: the node's inbound channel plus its status
/// snapshot.
#[derive(Clone)]
pub struct RpcState {
    pub inbound: mpsc::Sender<Inbound>,
    pub status: Arc<RwLock<NodeStatus>>,
}

/// Create the full router with all replica routes.
pub fn create_router(state: RpcState) -> Router {
    Router::new()
        // Protocol endpoints
        .route("/req", post(req_handler))
        .route("/preprepare", post(pre_prepare_handler))
        .route("/prepare", post(prepare_handler))
        .route("/commit", post(commit_handler))
        .route("/reply", post(reply_handler))
        // Probes
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Enqueue one decoded message; the response carries no payload.
fn enqueue(state: &RpcState, msg: Inbound) -> StatusCode {
    match state.inbound.try_send(msg) {
        Ok(()) => StatusCode::OK,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("inbound queue full, message dropped");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("node is shutting down, message dropped");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn req_handler(State(state): State<RpcState>, Json(msg): Json<RequestMsg>) -> StatusCode {
    enqueue(&state, Inbound::Request(msg))
}

async fn pre_prepare_handler(
    State(state): State<RpcState>,
    Json(msg): Json<PrePrepareMsg>,
) -> StatusCode {
    enqueue(&state, Inbound::PrePrepare(msg))
}

async fn prepare_handler(State(state): State<RpcState>, Json(msg): Json<VoteMsg>) -> StatusCode {
    enqueue(&state, Inbound::Vote(msg))
}

async fn commit_handler(State(state): State<RpcState>, Json(msg): Json<VoteMsg>) -> StatusCode {
    enqueue(&state, Inbound::Vote(msg))
}

async fn reply_handler(State(state): State<RpcState>, Json(msg): Json<ReplyMsg>) -> StatusCode {
    enqueue(&state, Inbound::Reply(msg))
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn status_handler(State(state): State<RpcState>) -> Json<NodeStatus> {
    Json(state.status.read().await.clone())
}
