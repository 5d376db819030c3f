use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::info;

use postrelay_common::{ContextMessage, ExtractionResponse, PostRecord};

use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchVideoRequest {
    target_url: String,
    #[serde(default)]
    record: PostRecord,
    #[serde(default)]
    update_existing: bool,
}

/// Resolve a post's video. Blocks until the request resolves, is superseded
/// or times out; the outcome is always a 200 with a structured body.
pub async fn api_fetch_video(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FetchVideoRequest>,
) -> impl IntoResponse {
    let pending = state
        .relay
        .fetch_video(&body.target_url, body.record, body.update_existing)
        .await;
    let request_id = pending.request_id();
    let outcome = pending.outcome().await;
    info!(%request_id, success = outcome.is_ok(), "Extraction request finished");

    Json(ExtractionResponse::from(&outcome))
}

/// Result posted back by an automation context.
pub async fn api_deliver_result(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ContextMessage>,
) -> impl IntoResponse {
    let accepted = state.relay.deliver_result(message).await;
    Json(serde_json::json!({"accepted": accepted}))
}

pub async fn api_pending_extraction(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.pending_extraction().await)
}
