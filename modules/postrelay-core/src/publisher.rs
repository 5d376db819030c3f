// Publisher: picks the Graph API calls for a post.
//
// Video wins over images. No images is a plain feed post, one image is a
// photo post, several images are uploaded unpublished and then attached to
// a single feed post in their original order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::info;

use graph_client::{GraphClient, GraphPost, PageToken, VideoSource};
use postrelay_common::{Credentials, PublishFailure, PublishRequest};

use crate::media;

/// Filename Facebook needs to recognise an uploaded video's format.
const UPLOAD_FILENAME: &str = "video.mp4";

/// The Graph API calls publishing needs.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn post_feed(
        &self,
        page: &PageToken,
        message: &str,
        attached_media: &[String],
    ) -> graph_client::Result<GraphPost>;

    async fn post_photo(
        &self,
        page: &PageToken,
        message: &str,
        image_url: &str,
    ) -> graph_client::Result<GraphPost>;

    async fn upload_unpublished_photo(
        &self,
        page: &PageToken,
        image_url: &str,
        index: usize,
    ) -> graph_client::Result<String>;

    async fn post_video(
        &self,
        page: &PageToken,
        description: &str,
        source: VideoSource,
    ) -> graph_client::Result<GraphPost>;
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn post_feed(
        &self,
        page: &PageToken,
        message: &str,
        attached_media: &[String],
    ) -> graph_client::Result<GraphPost> {
        GraphClient::post_feed(self, page, message, attached_media).await
    }

    async fn post_photo(
        &self,
        page: &PageToken,
        message: &str,
        image_url: &str,
    ) -> graph_client::Result<GraphPost> {
        GraphClient::post_photo(self, page, message, image_url).await
    }

    async fn upload_unpublished_photo(
        &self,
        page: &PageToken,
        image_url: &str,
        index: usize,
    ) -> graph_client::Result<String> {
        GraphClient::upload_unpublished_photo(self, page, image_url, index).await
    }

    async fn post_video(
        &self,
        page: &PageToken,
        description: &str,
        source: VideoSource,
    ) -> graph_client::Result<GraphPost> {
        GraphClient::post_video(self, page, description, source).await
    }
}

pub struct Publisher {
    graph: Arc<dyn GraphApi>,
}

impl Publisher {
    pub fn new(graph: Arc<dyn GraphApi>) -> Self {
        Self { graph }
    }

    /// Publish to the page. Returns the created post's identifier when the
    /// Graph API reported one.
    pub async fn publish(
        &self,
        credentials: &Credentials,
        request: &PublishRequest,
    ) -> Result<Option<String>, PublishFailure> {
        if !credentials.is_complete() {
            return Err(PublishFailure::MissingCredentials);
        }
        let page = PageToken::new(credentials.page_id.trim(), credentials.access_token.trim());
        let message = request.message.as_str();

        if let Some(ref video) = request.video {
            let source = video_source(video, request.video_is_inline)?;
            let post = self.graph.post_video(&page, message, source).await.map_err(http)?;
            info!(post_id = ?post.post_identifier(), "Published video post");
            return Ok(post.post_identifier().map(String::from));
        }

        let post = match request.images.as_slice() {
            [] => self.graph.post_feed(&page, message, &[]).await.map_err(http)?,
            [image] => self.graph.post_photo(&page, message, image).await.map_err(http)?,
            images => {
                let uploads = images.iter().enumerate().map(|(index, url)| {
                    let graph = self.graph.clone();
                    let page = page.clone();
                    async move {
                        graph
                            .upload_unpublished_photo(&page, url, index)
                            .await
                            .map_err(|e| PublishFailure::PartialUpload {
                                index,
                                message: e.to_string(),
                            })
                    }
                });
                let media_ids = try_join_all(uploads).await?;
                info!(photos = media_ids.len(), "Uploaded unpublished photos");
                self.graph
                    .post_feed(&page, message, &media_ids)
                    .await
                    .map_err(http)?
            }
        };

        info!(
            post_id = ?post.post_identifier(),
            images = request.images.len(),
            "Published post"
        );
        Ok(post.post_identifier().map(String::from))
    }
}

fn video_source(video: &str, inline: bool) -> Result<VideoSource, PublishFailure> {
    if inline && media::is_data_url(video) {
        let decoded = media::decode_data_url(video).map_err(|e| PublishFailure::Http {
            message: format!("Invalid uploaded video: {e}"),
        })?;
        return Ok(VideoSource::Upload {
            bytes: decoded.bytes,
            filename: UPLOAD_FILENAME.to_string(),
        });
    }
    Ok(VideoSource::Url(video.to_string()))
}

fn http(e: graph_client::GraphError) -> PublishFailure {
    PublishFailure::Http {
        message: e.to_string(),
    }
}
