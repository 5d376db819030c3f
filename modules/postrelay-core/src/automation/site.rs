// Extraction site automator: hands a post URL to the video download site,
// then polls the rendered page until it shows a direct media link, an
// intermediate download button, or an error.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use browserless_client::{BrowserlessClient, ContentRequest};
use postrelay_common::ExtractionResult;

use super::retry::{run_bounded, RetryPolicy, Step};
use super::Automator;

pub const DEFAULT_SITE_URL: &str = "https://snaptwitt.com";

/// 40 polls, one second apart.
pub const SITE_POLICY: RetryPolicy = RetryPolicy::new(40, Duration::from_secs(1));

/// Re-submit the form on every Nth pending attempt.
const RESUBMIT_EVERY: u32 = 5;

/// Error text reported when the site never produced a result.
pub const EXHAUSTED_ERROR: &str = "Timeout";

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a\b([^>]*)>(.*?)</a>"#).expect("valid regex"));
static HREF_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bhref\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bclass\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static ERROR_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<[a-z][a-z0-9]*\b([^>]*\bclass\s*=\s*["'][^"']*\b(?:alert-danger|error-message)\b[^"']*["'][^>]*)>(.*?)</"#,
    )
    .expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)display\s*:\s*none|\bd-none\b|\bhidden\b"#).expect("valid regex")
});

/// What one poll of the site showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    VideoLink(String),
    Intermediate(String),
    SiteError(String),
    Pending,
}

/// `https://site/#url=<encoded target>`, the entry point the site reads.
pub fn worker_url(site_url: &str, target_url: &str) -> String {
    format!(
        "{}/#url={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(target_url)
    )
}

/// Recover the post URL from a worker URL's `#url=` fragment, undoing up to
/// two rounds of percent-encoding. Input without a fragment is decoded the
/// same way, so callers may pass either form.
pub fn target_from_hash(input: &str) -> String {
    let raw = match input.split_once("url=") {
        Some((_, rest)) if input.contains('#') => rest,
        _ => input,
    };

    let mut decoded = decode_or_keep(raw);
    if decoded.contains("%3A") || decoded.contains("%2F") {
        decoded = decode_or_keep(&decoded);
    }
    decoded
        .replace("%3a", ":")
        .replace("%3A", ":")
        .replace("%2f", "/")
        .replace("%2F", "/")
        .replace("%3f", "?")
        .replace("%3F", "?")
        .replace("%3d", "=")
        .replace("%3D", "=")
}

fn decode_or_keep(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Classify a rendered page of the extraction site.
pub fn classify_page(html: &str, page_url: &str) -> PageState {
    let base = url::Url::parse(page_url).ok();
    let site_source = base
        .as_ref()
        .and_then(|b| b.host_str())
        .map(|host| format!("{host}/?source"));

    let anchors: Vec<Anchor> = ANCHOR_RE
        .captures_iter(html)
        .filter_map(|c| Anchor::parse(&c[1], &c[2], base.as_ref()))
        .collect();

    let direct = anchors.iter().find(|a| {
        (a.href.contains(".mp4") || a.href.contains("video"))
            && !site_source
                .as_deref()
                .is_some_and(|source| a.href.contains(source))
    });
    if let Some(a) = direct {
        return PageState::VideoLink(a.href.clone());
    }

    let intermediate = anchors.iter().find(|a| {
        let candidate = (a.has_class("btn") && a.href.contains("source=twitter"))
            || a.has_class("ff-goh4")
            || a.has_class("btn-secondary");
        candidate && (a.text.to_lowercase().contains("download") || a.href.contains("source=twitter"))
    });
    if let Some(a) = intermediate {
        return PageState::Intermediate(a.href.clone());
    }

    for cap in ERROR_BLOCK_RE.captures_iter(html) {
        if HIDDEN_RE.is_match(&cap[1]) {
            continue;
        }
        let text = TAG_RE.replace_all(&cap[2], "").trim().to_string();
        if !text.is_empty() {
            return PageState::SiteError(text);
        }
    }

    PageState::Pending
}

struct Anchor {
    href: String,
    classes: Vec<String>,
    text: String,
}

impl Anchor {
    fn parse(attrs: &str, inner: &str, base: Option<&url::Url>) -> Option<Self> {
        let raw = HREF_ATTR_RE.captures(attrs)?[1].replace("&amp;", "&");
        let href = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw
        } else {
            base?.join(&raw).ok()?.to_string()
        };
        let classes = CLASS_ATTR_RE
            .captures(attrs)
            .map(|c| c[1].split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        Some(Self {
            href,
            classes,
            text: TAG_RE.replace_all(inner, "").trim().to_string(),
        })
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// A rendered snapshot of a page and the URL it ended up on.
#[derive(Debug, Clone, Deserialize)]
pub struct SitePage {
    pub html: String,
    pub url: String,
}

/// Headless browser operations the site automator needs.
#[async_trait]
pub trait SiteBrowser: Send + Sync {
    /// Load `worker_url`, fill the form with `target_url` and submit it.
    async fn submit(&self, worker_url: &str, target_url: &str) -> Result<SitePage>;

    /// Render `url` as it currently stands.
    async fn render(&self, url: &str) -> Result<SitePage>;
}

pub struct SiteAutomator<B> {
    browser: B,
    site_url: String,
    policy: RetryPolicy,
}

impl<B: SiteBrowser> SiteAutomator<B> {
    pub fn new(browser: B, site_url: &str) -> Self {
        Self {
            browser,
            site_url: site_url.trim_end_matches('/').to_string(),
            policy: SITE_POLICY,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl<B: SiteBrowser> Automator for SiteAutomator<B> {
    async fn run(&self, target_url: &str) -> ExtractionResult {
        let target = target_from_hash(target_url);
        let entry = worker_url(&self.site_url, &target);
        info!(post_url = target.as_str(), "Extraction site: starting");

        // Page to re-render on the next poll. None means submit the form.
        let current: Mutex<Option<String>> = Mutex::new(None);
        let current = &current;
        let entry = entry.as_str();
        let target_url = target.as_str();

        let outcome = run_bounded(&self.policy, move |tick| async move {
            let follow = current.lock().await.clone();
            let page = match follow {
                Some(ref url) if tick.number % RESUBMIT_EVERY != 0 => self.browser.render(url).await,
                _ => self.browser.submit(entry, target_url).await,
            };
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(attempt = tick.number, error = %e, "Extraction site: browser call failed");
                    return Step::Retry;
                }
            };

            match classify_page(&page.html, &page.url) {
                PageState::VideoLink(url) => {
                    info!(attempt = tick.number, video_url = url.as_str(), "Extraction site: found video link");
                    Step::Done(ExtractionResult::found(url))
                }
                PageState::SiteError(message) => {
                    warn!(attempt = tick.number, error = message.as_str(), "Extraction site: site error");
                    Step::Done(ExtractionResult::failed(message))
                }
                PageState::Intermediate(url) => {
                    debug!(attempt = tick.number, url = url.as_str(), "Extraction site: following intermediate button");
                    *current.lock().await = Some(url);
                    Step::Retry
                }
                PageState::Pending => {
                    debug!(attempt = tick.number, "Extraction site: still waiting");
                    *current.lock().await = Some(page.url);
                    Step::Retry
                }
            }
        })
        .await;

        outcome.unwrap_or_else(|| {
            warn!(post_url = target.as_str(), "Extraction site: gave up waiting for a result");
            ExtractionResult::failed(EXHAUSTED_ERROR)
        })
    }
}

// --- Browserless implementation ---

const SUBMIT_SCRIPT: &str = r#"
export default async function ({ page, context }) {
  await page.goto(context.url, { waitUntil: "networkidle2" });
  const submitted = await page.evaluate((target) => {
    const input = document.querySelector('input[name="url"]')
      || document.querySelector('input[type="text"]')
      || document.querySelector('.form-control');
    if (!input) return false;
    input.value = target;
    for (const type of ["input", "change", "blur"]) {
      input.dispatchEvent(new Event(type, { bubbles: true }));
    }
    const button = document.querySelector('button[type="submit"]')
      || document.querySelector('.btn-download')
      || document.querySelector('#submit')
      || Array.from(document.querySelectorAll('button')).find((b) => b.innerText.includes('Download'));
    if (!button) return false;
    button.click();
    return true;
  }, context.target);
  if (submitted) {
    await new Promise((resolve) => setTimeout(resolve, context.settleMs));
  }
  return {
    data: { html: await page.content(), url: page.url() },
    type: "application/json",
  };
}
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitContext<'a> {
    url: &'a str,
    target: &'a str,
    settle_ms: u64,
}

/// [`SiteBrowser`] backed by a Browserless instance.
pub struct BrowserlessSite {
    client: BrowserlessClient,
    settle: Duration,
}

impl BrowserlessSite {
    pub fn new(client: BrowserlessClient) -> Self {
        Self {
            client,
            settle: Duration::from_millis(1500),
        }
    }
}

#[async_trait]
impl SiteBrowser for BrowserlessSite {
    async fn submit(&self, worker_url: &str, target_url: &str) -> Result<SitePage> {
        let context = SubmitContext {
            url: worker_url,
            target: target_url,
            settle_ms: self.settle.as_millis() as u64,
        };
        Ok(self.client.function(SUBMIT_SCRIPT, &context).await?)
    }

    async fn render(&self, url: &str) -> Result<SitePage> {
        let request = ContentRequest::new(url)
            .wait_until("networkidle2")
            .wait_for("a[href*=\".mp4\"], a[href*=\"video\"], .alert-danger, .error-message", 1000);
        let html = self.client.content(&request).await?;
        Ok(SitePage {
            html,
            url: url.to_string(),
        })
    }
}
