//! Notification RPC routes: send now, enqueue, dequeue.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use missive_common::error::NotifyError;
use missive_common::types::{DispatchOutcome, Envelope};
use missive_notifier::queue::DEFAULT_QUEUE_KEY;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/send", post(send_notification))
        .route(
            "/api/notifications/queue",
            post(add_to_queue)
                .delete(remove_from_queue)
                .get(queue_depth),
        )
}

/// Response for queue depth queries.
#[derive(Debug, Serialize)]
pub struct QueueDepthResponse {
    pub key: &'static str,
    pub depth: usize,
}

/// POST /api/notifications/send — Dispatch an envelope immediately, without queueing.
///
/// Used for one-off mail such as password resets and verification links.
async fn send_notification(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<DispatchOutcome>, NotifyError> {
    let outcome = state.service.send_notification(&envelope).await?;
    Ok(Json(outcome))
}

/// POST /api/notifications/queue — Push an envelope for the worker pool to deliver.
async fn add_to_queue(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<DispatchOutcome>, NotifyError> {
    let outcome = state.service.add_to_queue(&envelope).await?;
    Ok(Json(outcome))
}

/// DELETE /api/notifications/queue — Pop the oldest queued envelope.
async fn remove_from_queue(State(state): State<AppState>) -> Result<Json<Envelope>, NotifyError> {
    let envelope = state.service.remove_from_queue().await?;
    Ok(Json(envelope))
}

/// GET /api/notifications/queue — Number of envelopes waiting.
async fn queue_depth(
    State(state): State<AppState>,
) -> Result<Json<QueueDepthResponse>, NotifyError> {
    let depth = state.service.queue_depth().await?;
    Ok(Json(QueueDepthResponse {
        key: DEFAULT_QUEUE_KEY,
        depth,
    }))
}
