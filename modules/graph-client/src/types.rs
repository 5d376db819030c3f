use serde::{Deserialize, Serialize};

/// Page id plus the page access token every publishing call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub page_id: String,
    pub access_token: String,
}

impl PageToken {
    pub fn new(page_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Where a video post takes its bytes from.
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Facebook fetches the file itself (`file_url`).
    Url(String),
    /// Bytes sent as the multipart `source` field.
    Upload { bytes: Vec<u8>, filename: String },
}

/// Object ids returned by publishing endpoints.
///
/// `/feed` returns only `id`; `/photos` returns `id` plus `post_id`;
/// `/videos` returns `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GraphPost {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
}

impl GraphPost {
    /// The feed-visible identifier: `post_id` when present, else `id`.
    pub fn post_identifier(&self) -> Option<&str> {
        self.post_id.as_deref().or(self.id.as_deref())
    }
}

/// One entry of the feed `attached_media` parameter.
#[derive(Debug, Clone, Serialize)]
pub struct AttachedMedia<'a> {
    pub media_fbid: &'a str,
}

/// Error envelope of a failed Graph API call.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    pub message: Option<String>,
}
