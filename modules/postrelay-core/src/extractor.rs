// Post extractor: rendered markup of one X post -> PostRecord.
//
// Markup heuristics only. Regexes over the article HTML, no DOM. Anything
// not found is left empty; extraction itself never fails.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use postrelay_common::PostRecord;

static TWEET_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)data-testid="tweetText"[^>]*>(.*?)</div>"#).expect("valid regex")
});
static STATUS_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*["'](?:https?://[^/"']+)?/([^/"'?#]+)/status/(\d+)"#)
        .expect("valid regex")
});
static USER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)data-testid="User-Name".*?>@([A-Za-z0-9_]{1,15})<"#).expect("valid regex")
});
static TWEET_ID_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-tweet-id\s*=\s*["'](\d+)["']"#).expect("valid regex")
});
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static VIDEO_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:video|source)\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static ATTR_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\w-]+\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static VIDEO_CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-testid="(?:videoPlayer|videoComponent)""#).expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static EMOJI_ALT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\b[^>]*?\balt\s*=\s*["']([^"']+)["'][^>]*>"#).expect("valid regex")
});

/// Extract a PostRecord from the HTML of a single post article.
pub fn extract_post(html: &str) -> PostRecord {
    let (status_user, post_id) = status_link(html);
    let username = status_user.or_else(|| {
        USER_NAME_RE
            .captures(html)
            .map(|c| c[1].to_string())
    });
    let post_id = post_id.or_else(|| {
        TWEET_ID_ATTR_RE
            .captures(html)
            .map(|c| c[1].to_string())
    });

    let mut text = post_text(html);
    if let Some(ref user) = username {
        text.push_str(&format!("\n\nCredit from X.com: @{user}"));
    }

    let video = video_source(html);
    let has_video = video.is_some() || VIDEO_CONTAINER_RE.is_match(html);

    PostRecord {
        text,
        images: media_images(html),
        video,
        post_id,
        username,
        has_video,
    }
}

/// First `/user/status/id` link in the article.
fn status_link(html: &str) -> (Option<String>, Option<String>) {
    STATUS_HREF_RE
        .captures_iter(html)
        .find(|c| &c[1] != "i")
        .map(|c| (Some(c[1].to_string()), Some(c[2].to_string())))
        .or_else(|| {
            // `/i/status/<id>` carries an id but no author.
            STATUS_HREF_RE
                .captures(html)
                .map(|c| (None, Some(c[2].to_string())))
        })
        .unwrap_or((None, None))
}

fn post_text(html: &str) -> String {
    let Some(cap) = TWEET_TEXT_RE.captures(html) else {
        return String::new();
    };
    let inner = BREAK_RE.replace_all(&cap[1], "\n");
    let inner = EMOJI_ALT_RE.replace_all(&inner, "$1");
    let stripped = TAG_RE.replace_all(&inner, "");
    decode_entities(stripped.trim())
}

/// Tweet media images only: no avatars, no emoji.
fn media_images(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMG_SRC_RE
        .captures_iter(html)
        .map(|c| decode_entities(&c[1]))
        .filter(|src| {
            src.contains("twimg")
                && !src.contains("profile_images")
                && !src.contains("/emoji/")
                && (src.contains("/media/") || src.contains("pbs.twimg.com"))
        })
        .filter(|src| seen.insert(src.clone()))
        .collect()
}

fn video_source(html: &str) -> Option<String> {
    if let Some(src) = VIDEO_SRC_RE
        .captures_iter(html)
        .map(|c| decode_entities(&c[1]))
        .find(|s| !s.is_empty())
    {
        return Some(src);
    }

    ATTR_VALUE_RE
        .captures_iter(html)
        .map(|c| decode_entities(&c[1]))
        .find(|v| {
            v.contains("video.twimg.com") || v.starts_with("blob:https://x.com") || v.contains(".mp4")
        })
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_WITH_IMAGES: &str = r#"
        <article data-testid="tweet">
          <div data-testid="User-Name"><a href="/nasa"><span>NASA</span></a><span>@nasa</span></div>
          <a href="/nasa/status/1790000000000000001"><time>2h</time></a>
          <div lang="en" data-testid="tweetText"><span>Launch day &amp; clear skies</span><img alt="🚀" src="https://abs-0.twimg.com/emoji/v2/svg/1f680.svg"><br><span>Liftoff at 9am</span></div>
          <img src="https://pbs.twimg.com/profile_images/1/avatar.jpg">
          <img src="https://pbs.twimg.com/media/AAA.jpg?format=jpg&amp;name=small">
          <img src="https://pbs.twimg.com/media/BBB.jpg?format=jpg&amp;name=small">
        </article>
    "#;

    #[test]
    fn extracts_text_with_credit() {
        let record = extract_post(POST_WITH_IMAGES);
        assert_eq!(
            record.text,
            "Launch day & clear skies🚀\nLiftoff at 9am\n\nCredit from X.com: @nasa"
        );
        assert_eq!(record.username.as_deref(), Some("nasa"));
        assert_eq!(record.post_id.as_deref(), Some("1790000000000000001"));
    }

    #[test]
    fn keeps_only_media_images() {
        let record = extract_post(POST_WITH_IMAGES);
        assert_eq!(
            record.images,
            vec![
                "https://pbs.twimg.com/media/AAA.jpg?format=jpg&name=small",
                "https://pbs.twimg.com/media/BBB.jpg?format=jpg&name=small",
            ]
        );
        assert!(!record.has_video);
        assert!(record.video.is_none());
    }

    #[test]
    fn finds_video_element_source() {
        let html = r#"
            <a href="/jack/status/20">x</a>
            <div data-testid="videoPlayer"><video preload="none" src="blob:https://x.com/abc-123"></video></div>
        "#;
        let record = extract_post(html);
        assert_eq!(record.video.as_deref(), Some("blob:https://x.com/abc-123"));
        assert!(record.has_video);
    }

    #[test]
    fn falls_back_to_video_like_attribute() {
        let html = r#"
            <a href="/jack/status/20">x</a>
            <div data-testid="videoComponent" data-src="https://video.twimg.com/ext_tw_video/1/pu/vid/a.mp4"></div>
        "#;
        let record = extract_post(html);
        assert_eq!(
            record.video.as_deref(),
            Some("https://video.twimg.com/ext_tw_video/1/pu/vid/a.mp4")
        );
    }

    #[test]
    fn video_player_without_source_still_flags_video() {
        let html = r#"<a href="/jack/status/20">x</a><div data-testid="videoPlayer"><img src="https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/t.jpg"></div>"#;
        let record = extract_post(html);
        assert!(record.has_video);
        assert!(record.video.is_none());
    }

    #[test]
    fn username_falls_back_to_user_name_block() {
        let html = r#"
            <div data-testid="User-Name"><span>Jack</span><span>@jack</span></div>
            <a href="/i/status/55">x</a>
        "#;
        let record = extract_post(html);
        assert_eq!(record.username.as_deref(), Some("jack"));
        assert_eq!(record.post_id.as_deref(), Some("55"));
    }

    #[test]
    fn empty_markup_yields_empty_record() {
        let record = extract_post("<article></article>");
        assert_eq!(record, PostRecord::default());
    }
}
