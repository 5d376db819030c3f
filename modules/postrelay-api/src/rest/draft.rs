use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use postrelay_common::{ExtractionResponse, PostRecord};

use super::{error_response, relay_error};
use crate::AppState;

/// Either an already-extracted record or the post's rendered HTML.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    record: Option<PostRecord>,
    html: Option<String>,
    /// Hold the response until the started extraction resolves.
    #[serde(default)]
    wait: bool,
}

#[derive(Deserialize)]
pub struct EditTextRequest {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadVideoRequest {
    data_url: String,
}

pub async fn api_submit_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse {
    match (body.record, body.html) {
        (Some(record), _) => match state.relay.submit_post(record).await {
            Ok(report) => Json(serde_json::json!({
                "draft": report.draft,
                "downloadStarted": report.download_started,
                "extractionStarted": false,
            }))
            .into_response(),
            Err(e) => relay_error(e),
        },
        (None, Some(html)) => {
            let preview = match state.relay.submit_html(&html).await {
                Ok(preview) => preview,
                Err(e) => return relay_error(e),
            };
            let started = preview.extraction.is_some();
            let request_id = preview.extraction.as_ref().map(|p| p.request_id());

            let extraction = match preview.extraction {
                Some(pending) if body.wait => {
                    Some(ExtractionResponse::from(&pending.outcome().await))
                }
                _ => None,
            };

            Json(serde_json::json!({
                "draft": preview.submitted.draft,
                "downloadStarted": preview.submitted.download_started,
                "extractionStarted": started,
                "requestId": request_id,
                "extraction": extraction,
            }))
            .into_response()
        }
        (None, None) => error_response(
            StatusCode::BAD_REQUEST,
            "Provide either a record or the post html",
        ),
    }
}

pub async fn api_draft(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let draft = match state.relay.draft().await {
        Ok(draft) => draft,
        Err(e) => return relay_error(e),
    };
    let uploaded = match state.relay.uploaded_video().await {
        Ok(uploaded) => uploaded,
        Err(e) => return relay_error(e),
    };
    // The override only counts for the post it was uploaded against.
    let has_uploaded_video = match (&draft, &uploaded) {
        (Some(d), Some(u)) => u.post_id.as_deref() == d.post_id(),
        _ => false,
    };

    Json(serde_json::json!({
        "draft": draft,
        "hasUploadedVideo": has_uploaded_video,
    }))
    .into_response()
}

pub async fn api_clear_draft(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.clear_draft().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_edit_text(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EditTextRequest>,
) -> impl IntoResponse {
    match state.relay.edit_text(&body.text).await {
        Ok(draft) => Json(serde_json::json!({"draft": draft})).into_response(),
        Err(e) => relay_error(e),
    }
}

pub async fn api_upload_video(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadVideoRequest>,
) -> impl IntoResponse {
    match state.relay.upload_video(&body.data_url).await {
        Ok(uploaded) => Json(serde_json::json!({
            "postId": uploaded.post_id,
            "stored": true,
        }))
        .into_response(),
        Err(e) => relay_error(e),
    }
}
