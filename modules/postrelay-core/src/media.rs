// Media URL helpers shared by the downloader and the publisher.

use anyhow::{Context, Result};
use base64::Engine;

/// Decoded `data:` URL payload.
pub(crate) struct InlineMedia {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub(crate) fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// `blob:` URLs only resolve inside the page that minted them.
pub(crate) fn is_fetchable(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || is_data_url(url)
}

/// Decode a base64 `data:<mime>;base64,<payload>` URL.
pub(crate) fn decode_data_url(url: &str) -> Result<InlineMedia> {
    let rest = url.strip_prefix("data:").context("not a data: URL")?;
    let (header, payload) = rest.split_once(',').context("data: URL has no payload")?;
    let Some(mime_type) = header.strip_suffix(";base64") else {
        anyhow::bail!("only base64 data: URLs are supported");
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 payload")?;

    Ok(InlineMedia {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}

/// File extension for a saved video.
pub(crate) fn video_extension(url: &str) -> &'static str {
    if url.contains(".mp4") || url.starts_with("data:video/mp4") {
        "mp4"
    } else {
        "mov"
    }
}
