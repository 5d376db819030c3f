use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Identity tokens ---

/// Token identifying one extraction request. Automation contexts are tagged
/// with it and echo it back alongside their result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one automation context (a headless browser job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// --- Posts and drafts ---

/// Content scraped from one social post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub has_video: bool,
}

impl PostRecord {
    /// Canonical status URL used as the extraction target.
    pub fn status_url(&self) -> Option<String> {
        self.post_id
            .as_deref()
            .map(|id| format!("https://x.com/i/status/{id}"))
    }
}

/// The current editable post plus fields derived after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(flatten)]
    pub record: PostRecord,
    #[serde(default)]
    pub saved_folder_path: Option<String>,
    /// The video URL came from the extraction site and is directly fetchable.
    #[serde(default)]
    pub video_is_direct: bool,
    /// The video is an inline `data:` URL rather than a remote link.
    #[serde(default)]
    pub video_is_inline: bool,
    pub submitted_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(record: PostRecord) -> Self {
        Self {
            record,
            saved_folder_path: None,
            video_is_direct: false,
            video_is_inline: false,
            submitted_at: Utc::now(),
        }
    }

    pub fn post_id(&self) -> Option<&str> {
        self.record.post_id.as_deref()
    }
}

/// A user-supplied video that overrides the Draft's video for the post it was
/// uploaded against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedVideo {
    pub data_url: String,
    pub post_id: Option<String>,
}

// --- Extraction ---

/// A caller's request to resolve a post's video via automation.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub request_id: RequestId,
    pub target_url: String,
    pub initial_record: PostRecord,
    pub update_existing: bool,
    pub created_at: DateTime<Utc>,
}

impl ExtractionRequest {
    pub fn new(target_url: &str, initial_record: PostRecord, update_existing: bool) -> Self {
        Self {
            request_id: RequestId::new(),
            target_url: target_url.to_string(),
            initial_record,
            update_existing,
            created_at: Utc::now(),
        }
    }
}

/// Terminal report of one automation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn found(video_url: impl Into<String>) -> Self {
        Self {
            success: true,
            video_url: Some(video_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            video_url: None,
            error: Some(error.into()),
        }
    }
}

/// A result message from an automation context, tagged with the request it
/// was opened for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    pub context: ContextId,
    pub tag: RequestId,
    pub result: ExtractionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("Timed out waiting for the extraction site")]
    Timeout,

    #[error("A newer extraction request replaced this one")]
    Superseded,

    #[error("Extraction site error: {0}")]
    SiteError(String),
}

impl ExtractionFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionFailure::Timeout => "timeout",
            ExtractionFailure::Superseded => "superseded",
            ExtractionFailure::SiteError(_) => "site_error",
        }
    }
}

/// What a caller of the coordinator receives: the resolved video URL or a
/// structured failure.
pub type ExtractionOutcome = Result<String, ExtractionFailure>;

/// Wire shape of an [`ExtractionOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ExtractionOutcome> for ExtractionResponse {
    fn from(outcome: &ExtractionOutcome) -> Self {
        match outcome {
            Ok(url) => Self {
                success: true,
                video_url: Some(url.clone()),
                reason: None,
                error: None,
            },
            Err(failure) => Self {
                success: false,
                video_url: None,
                reason: Some(failure.reason().to_string()),
                error: Some(failure.to_string()),
            },
        }
    }
}

// --- Downloads ---

/// Outcome of a best-effort media download. Never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DownloadReport {
    pub fn saved(folder_path: impl Into<String>) -> Self {
        Self {
            success: true,
            folder_path: Some(folder_path.into()),
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            folder_path: None,
            reason: Some(reason.into()),
        }
    }
}

// --- Publishing ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub access_token: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.page_id.trim().is_empty() && !self.access_token.trim().is_empty()
    }
}

/// A Facebook group the Draft can be filled into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub message: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
    /// `video` is a base64 `data:` URL to upload rather than a remote URL.
    #[serde(default)]
    pub video_is_inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishFailure {
    #[error("Facebook Page ID or Access Token is missing. Please set them in settings.")]
    MissingCredentials,

    #[error("{message}")]
    Http { message: String },

    #[error("Failed to upload photo {}: {message}", .index + 1)]
    PartialUpload { index: usize, message: String },
}

impl PublishFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            PublishFailure::MissingCredentials => "missing_credentials",
            PublishFailure::Http { .. } => "http_error",
            PublishFailure::PartialUpload { .. } => "partial_multi_upload_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostResponse {
    pub fn published(post_id: Option<String>) -> Self {
        Self {
            success: true,
            post_id,
            reason: None,
            error: None,
        }
    }
}

impl From<PublishFailure> for PostResponse {
    fn from(failure: PublishFailure) -> Self {
        Self {
            success: false,
            post_id: None,
            reason: Some(failure.reason().to_string()),
            error: Some(failure.to_string()),
        }
    }
}
