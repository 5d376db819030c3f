use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use postrelay_common::Group;

use super::relay_error;
use crate::AppState;

#[derive(Deserialize, Default)]
pub struct PublishBody {
    /// Replaces the Draft text when set.
    message: Option<String>,
}

#[derive(Deserialize)]
pub struct GroupPostBody {
    text: Option<String>,
    link: Option<String>,
}

/// Publishing failures are reported in the body, not as HTTP errors.
pub async fn api_publish(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PublishBody>,
) -> impl IntoResponse {
    match state.relay.post_to_facebook(body.message).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_groups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.groups().await {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_set_groups(
    State(state): State<Arc<AppState>>,
    Json(groups): Json<Vec<Group>>,
) -> impl IntoResponse {
    match state.relay.set_groups(groups).await {
        Ok(()) => Json(serde_json::json!({"saved": true})).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_post_to_groups(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GroupPostBody>,
) -> impl IntoResponse {
    match state.relay.post_to_groups(body.text, body.link).await {
        Ok(reports) => Json(serde_json::json!({ "groups": reports })).into_response(),
        Err(e) => relay_error(e),
    }
}
