pub mod error;
pub mod types;

pub use error::{GraphError, Result};
pub use types::{AttachedMedia, GraphPost, PageToken, VideoSource};

use reqwest::multipart::{Form, Part};
use types::ErrorEnvelope;

/// Default Graph API root, pinned to the version the publishing calls were written against.
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn edge(&self, page_id: &str, edge: &str) -> String {
        format!("{}/{}/{}", self.base_url, page_id, edge)
    }

    /// Publish a text post to the page feed, optionally attaching
    /// previously uploaded unpublished photos.
    pub async fn post_feed(
        &self,
        page: &PageToken,
        message: &str,
        attached_media: &[String],
    ) -> Result<GraphPost> {
        let mut form = vec![
            ("message", message.to_string()),
            ("access_token", page.access_token.clone()),
        ];

        let fallback = if attached_media.is_empty() {
            "Failed to post text to Facebook"
        } else {
            let media: Vec<AttachedMedia<'_>> = attached_media
                .iter()
                .map(|id| AttachedMedia { media_fbid: id })
                .collect();
            form.push(("attached_media", serde_json::to_string(&media)?));
            "Failed to create multi-photo post on Facebook"
        };

        tracing::info!(
            page_id = %page.page_id,
            attached = attached_media.len(),
            "Posting to page feed"
        );

        let resp = self
            .client
            .post(self.edge(&page.page_id, "feed"))
            .form(&form)
            .send()
            .await?;

        parse_post(resp, fallback).await
    }

    /// Publish a single photo (by URL) with a caption.
    pub async fn post_photo(
        &self,
        page: &PageToken,
        message: &str,
        image_url: &str,
    ) -> Result<GraphPost> {
        tracing::info!(page_id = %page.page_id, image_url, "Posting single photo");

        let resp = self
            .client
            .post(self.edge(&page.page_id, "photos"))
            .form(&[
                ("message", message),
                ("url", image_url),
                ("access_token", page.access_token.as_str()),
            ])
            .send()
            .await?;

        parse_post(resp, "Failed to post photo to Facebook").await
    }

    /// Upload a photo without publishing it. Returns the photo id to be
    /// referenced from a later feed post's `attached_media`.
    pub async fn upload_unpublished_photo(
        &self,
        page: &PageToken,
        image_url: &str,
        index: usize,
    ) -> Result<String> {
        tracing::debug!(page_id = %page.page_id, image_url, index, "Uploading unpublished photo");

        let resp = self
            .client
            .post(self.edge(&page.page_id, "photos"))
            .form(&[
                ("url", image_url),
                ("published", "false"),
                ("access_token", page.access_token.as_str()),
            ])
            .send()
            .await?;

        let fallback = format!("Failed to upload photo {}", index + 1);
        let post = parse_post(resp, &fallback).await?;
        post.id.ok_or(GraphError::MissingId)
    }

    /// Publish a video post, either by remote URL or by uploading the bytes.
    pub async fn post_video(
        &self,
        page: &PageToken,
        description: &str,
        source: VideoSource,
    ) -> Result<GraphPost> {
        let mut form = Form::new()
            .text("description", description.to_string())
            .text("access_token", page.access_token.clone());

        form = match source {
            VideoSource::Url(url) => {
                tracing::info!(page_id = %page.page_id, url = %url, "Posting video by URL");
                form.text("file_url", url)
            }
            VideoSource::Upload { bytes, filename } => {
                tracing::info!(
                    page_id = %page.page_id,
                    bytes = bytes.len(),
                    "Posting video by upload"
                );
                let part = Part::bytes(bytes)
                    .file_name(filename)
                    .mime_str("video/mp4")?;
                form.part("source", part)
            }
        };

        let resp = self
            .client
            .post(self.edge(&page.page_id, "videos"))
            .multipart(form)
            .send()
            .await?;

        parse_post(resp, "Failed to post video to Facebook").await
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn parse_post(resp: reqwest::Response, fallback: &str) -> Result<GraphPost> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let message = vendor_message(&body).unwrap_or_else(|| fallback.to_string());
        tracing::warn!(status = status.as_u16(), message = %message, "Graph API call failed");
        return Err(GraphError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Pull `error.message` out of a Graph API error body.
pub fn vendor_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.is_empty())
}
