use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use postrelay_common::Credentials;

use super::relay_error;
use crate::AppState;

#[derive(Deserialize)]
pub struct PanelBody {
    open: bool,
}

/// Whether page credentials are set. The token itself is never returned.
pub async fn api_credentials_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.credentials_configured().await {
        Ok(configured) => Json(serde_json::json!({"configured": configured})).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_set_credentials(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> impl IntoResponse {
    match state.relay.set_credentials(credentials).await {
        Ok(()) => Json(serde_json::json!({"configured": true})).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_panel(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.panel_open().await {
        Ok(open) => Json(serde_json::json!({"open": open})).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_set_panel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PanelBody>,
) -> impl IntoResponse {
    match state.relay.set_panel_open(body.open).await {
        Ok(()) => Json(serde_json::json!({"open": body.open})).into_response(),
        Err(e) => relay_error(e),
    }
}
