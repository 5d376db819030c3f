// Relay: the message handlers that tie the components together. The HTTP
// API maps its routes onto these one-to-one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use postrelay_common::{
    ContextMessage, Credentials, Draft, Group, PostRecord, PostResponse, PublishRequest,
    RelayError, UploadedVideo,
};

use crate::automation::{AutomationHost, ComposerAction, GroupPoster, GroupReport};
use crate::coordinator::{PendingExtraction, PendingSummary, RequestCoordinator};
use crate::downloader::{spawn_save, Downloader};
use crate::extractor::extract_post;
use crate::media;
use crate::publisher::{GraphApi, Publisher};
use crate::store::{Store, DRAFT_KEY, UPLOADED_VIDEO_KEY};

/// Collaborators a [`Relay`] is assembled from.
pub struct RelayDeps {
    pub store: Store,
    pub host: Arc<dyn AutomationHost>,
    pub downloader: Arc<dyn Downloader>,
    pub graph: Arc<dyn GraphApi>,
    pub composer: Arc<dyn ComposerAction>,
    pub extraction_timeout: Duration,
}

/// Result of storing a submitted post.
#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub draft: Draft,
    /// A background save of the video was started.
    pub download_started: bool,
}

/// Result of previewing a post from its markup. `extraction` is set when the
/// post has a video and its resolution was started.
pub struct PreviewReport {
    pub submitted: SubmitReport,
    pub extraction: Option<PendingExtraction>,
}

#[derive(Clone)]
pub struct Relay {
    store: Store,
    coordinator: RequestCoordinator,
    downloader: Arc<dyn Downloader>,
    publisher: Arc<Publisher>,
    groups: Arc<GroupPoster>,
}

impl Relay {
    pub fn new(deps: RelayDeps) -> Self {
        let coordinator = RequestCoordinator::new(
            deps.host,
            deps.store.clone(),
            deps.downloader.clone(),
            deps.extraction_timeout,
        );
        Self {
            store: deps.store,
            coordinator,
            downloader: deps.downloader,
            publisher: Arc::new(Publisher::new(deps.graph)),
            groups: Arc::new(GroupPoster::new(deps.composer)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    // --- Drafts ---

    /// Store `record` as the current Draft and start saving its video in the
    /// background. The saved folder lands on the Draft when the save finishes.
    /// An uploaded video that belongs to another post is discarded.
    pub async fn submit_post(&self, record: PostRecord) -> Result<SubmitReport, RelayError> {
        let draft = Draft::new(record);

        if let Some(uploaded) = self.store.uploaded_video().await? {
            if uploaded.post_id.as_deref() != draft.post_id() {
                info!(post_id = ?draft.post_id(), "New post, discarding uploaded video");
                self.store.clear_uploaded_video().await?;
            }
        }
        self.store.set_draft(&draft).await?;

        let download_started = draft.record.video.is_some();
        if download_started {
            spawn_save(
                self.downloader.clone(),
                self.store.clone(),
                draft.record.clone(),
            );
        }

        info!(
            post_id = ?draft.post_id(),
            images = draft.record.images.len(),
            has_video = draft.record.has_video,
            download_started,
            "Draft stored"
        );
        Ok(SubmitReport {
            draft,
            download_started,
        })
    }

    /// Extract a post from its markup, store it without the in-page video
    /// and start resolving a downloadable video for it.
    pub async fn submit_html(&self, html: &str) -> Result<PreviewReport, RelayError> {
        let record = extract_post(html);
        let has_video = record.has_video;

        let submitted = self
            .submit_post(PostRecord {
                video: None,
                ..record.clone()
            })
            .await?;

        let extraction = match record.status_url() {
            Some(target) if has_video => Some(
                self.coordinator
                    .start_extraction(&target, record, true)
                    .await,
            ),
            _ => None,
        };

        Ok(PreviewReport {
            submitted,
            extraction,
        })
    }

    pub async fn draft(&self) -> Result<Option<Draft>, RelayError> {
        Ok(self.store.draft().await?)
    }

    pub async fn edit_text(&self, text: &str) -> Result<Draft, RelayError> {
        let draft = self.store.draft().await?.ok_or(RelayError::NoDraft)?;
        let post_id = draft.post_id().map(String::from);

        let updated = self
            .store
            .update_draft_if(post_id.as_deref(), |d| d.record.text = text.to_string())
            .await?;
        if !updated {
            return Err(RelayError::NoDraft);
        }
        self.store.draft().await?.ok_or(RelayError::NoDraft)
    }

    /// Drop the Draft and any uploaded video.
    pub async fn clear_draft(&self) -> Result<(), RelayError> {
        self.store.remove(&[DRAFT_KEY, UPLOADED_VIDEO_KEY]).await?;
        info!("Draft cleared");
        Ok(())
    }

    /// Attach a user-supplied video (`data:` URL) to the current Draft's post.
    pub async fn upload_video(&self, data_url: &str) -> Result<UploadedVideo, RelayError> {
        let draft = self.store.draft().await?.ok_or(RelayError::NoDraft)?;
        let decoded = media::decode_data_url(data_url)
            .map_err(|e| RelayError::Validation(format!("Invalid video upload: {e}")))?;
        if !decoded.mime_type.starts_with("video/") {
            return Err(RelayError::Validation(format!(
                "Expected a video, got {}",
                decoded.mime_type
            )));
        }

        let uploaded = UploadedVideo {
            data_url: data_url.to_string(),
            post_id: draft.record.post_id.clone(),
        };
        self.store.set_uploaded_video(&uploaded).await?;
        info!(post_id = ?uploaded.post_id, bytes = decoded.bytes.len(), "Uploaded video stored");
        Ok(uploaded)
    }

    pub async fn uploaded_video(&self) -> Result<Option<UploadedVideo>, RelayError> {
        Ok(self.store.uploaded_video().await?)
    }

    // --- Extraction ---

    pub async fn fetch_video(
        &self,
        target_url: &str,
        record: PostRecord,
        update_existing: bool,
    ) -> PendingExtraction {
        self.coordinator
            .start_extraction(target_url, record, update_existing)
            .await
    }

    pub async fn deliver_result(&self, message: ContextMessage) -> bool {
        self.coordinator.deliver(message).await
    }

    pub async fn pending_extraction(&self) -> Option<PendingSummary> {
        self.coordinator.pending_request().await
    }

    // --- Publishing ---

    /// Publish the Draft to the page. `message` replaces the Draft text when
    /// given. An uploaded video for this post takes precedence over the
    /// Draft's own video.
    pub async fn post_to_facebook(
        &self,
        message: Option<String>,
    ) -> Result<PostResponse, RelayError> {
        let draft = self.store.draft().await?.ok_or(RelayError::NoDraft)?;
        let credentials = self.store.credentials().await?.unwrap_or_default();
        let uploaded = self
            .store
            .uploaded_video()
            .await?
            .filter(|u| u.post_id.as_deref() == draft.post_id());

        let (video, video_is_inline) = match uploaded {
            Some(u) => (Some(u.data_url), true),
            None => match draft.record.video {
                Some(ref v) if !media::is_fetchable(v) => {
                    warn!(video = v.as_str(), "Draft video cannot be fetched by Facebook, posting without it");
                    (None, false)
                }
                ref v => (v.clone(), draft.video_is_inline),
            },
        };

        let request = PublishRequest {
            message: message.unwrap_or_else(|| draft.record.text.clone()),
            images: draft.record.images.clone(),
            video,
            video_is_inline,
        };

        Ok(match self.publisher.publish(&credentials, &request).await {
            Ok(post_id) => {
                info!(?post_id, "Draft published to Facebook");
                PostResponse::published(post_id)
            }
            Err(failure) => {
                warn!(reason = failure.reason(), error = %failure, "Publishing failed");
                PostResponse::from(failure)
            }
        })
    }

    // --- Settings ---

    pub async fn set_credentials(&self, credentials: Credentials) -> Result<(), RelayError> {
        let credentials = Credentials {
            page_id: credentials.page_id.trim().to_string(),
            access_token: credentials.access_token.trim().to_string(),
        };
        if !credentials.is_complete() {
            return Err(RelayError::Validation(
                "Please enter both Page ID and Access Token".to_string(),
            ));
        }
        self.store.set_credentials(&credentials).await?;
        info!(page_id = credentials.page_id.as_str(), "Facebook credentials saved");
        Ok(())
    }

    pub async fn credentials_configured(&self) -> Result<bool, RelayError> {
        Ok(self
            .store
            .credentials()
            .await?
            .is_some_and(|c| c.is_complete()))
    }

    pub async fn groups(&self) -> Result<Vec<Group>, RelayError> {
        Ok(self.store.groups().await?)
    }

    pub async fn set_groups(&self, groups: Vec<Group>) -> Result<(), RelayError> {
        if let Some(bad) = groups.iter().find(|g| !g.url.trim().starts_with("https://")) {
            return Err(RelayError::Validation(format!(
                "Group \"{}\" needs an https:// URL",
                bad.name
            )));
        }
        self.store.set_groups(&groups).await?;
        info!(count = groups.len(), "Group list saved");
        Ok(())
    }

    /// Fill every configured group's composer. `text` defaults to the Draft text.
    pub async fn post_to_groups(
        &self,
        text: Option<String>,
        link: Option<String>,
    ) -> Result<Vec<GroupReport>, RelayError> {
        let text = match text {
            Some(text) => text,
            None => self.store.draft().await?.ok_or(RelayError::NoDraft)?.record.text,
        };
        let groups = self.store.groups().await?;
        self.groups
            .post_to_groups(&groups, &text, link.as_deref().unwrap_or_default())
            .await
    }

    pub async fn set_panel_open(&self, open: bool) -> Result<(), RelayError> {
        Ok(self.store.set_panel_open(open).await?)
    }

    pub async fn panel_open(&self) -> Result<bool, RelayError> {
        Ok(self.store.panel_open().await?)
    }
}
