// Facebook group composer: fills the Draft into each configured group's
// "Write something..." composer and presses Post.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use browserless_client::BrowserlessClient;
use postrelay_common::{Group, RelayError};

use super::retry::{run_bounded, RetryPolicy, Step};

/// 15 tries, 600 ms apart.
pub const COMPOSER_POLICY: RetryPolicy = RetryPolicy::new(15, Duration::from_millis(600));

/// Join trimmed text and link the way group posts expect them. `None` when
/// both are blank.
pub fn build_post_content(text: &str, link: &str) -> Option<String> {
    let parts: Vec<&str> = [text.trim(), link.trim()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n "))
    }
}

/// Outcome of one composer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerStep {
    Posted,
    /// Composer not on screen yet; worth another try.
    NotReady,
    Failed(String),
}

/// One try at filling and posting into a group's composer.
#[async_trait]
pub trait ComposerAction: Send + Sync {
    async fn attempt(&self, group_url: &str, content: &str, has_link: bool) -> ComposerStep;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub name: String,
    pub url: String,
    pub posted: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct GroupPoster {
    action: Arc<dyn ComposerAction>,
    policy: RetryPolicy,
}

impl GroupPoster {
    pub fn new(action: Arc<dyn ComposerAction>) -> Self {
        Self {
            action,
            policy: COMPOSER_POLICY,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Post into every group in order. One group failing does not stop the rest.
    pub async fn post_to_groups(
        &self,
        groups: &[Group],
        text: &str,
        link: &str,
    ) -> Result<Vec<GroupReport>, RelayError> {
        let content = build_post_content(text, link)
            .ok_or_else(|| RelayError::Validation("Nothing to post: text and link are empty".into()))?;
        if groups.is_empty() {
            return Err(RelayError::Validation("No groups configured".into()));
        }
        let has_link = !link.trim().is_empty();

        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            let report = self.post_one(group, &content, has_link).await;
            if report.posted {
                info!(group = group.name.as_str(), attempts = report.attempts, "Posted to group");
            } else {
                warn!(group = group.name.as_str(), error = ?report.error, "Group post failed");
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn post_one(&self, group: &Group, content: &str, has_link: bool) -> GroupReport {
        let action = self.action.as_ref();
        let url = group.url.as_str();

        let mut attempts = 0;
        let outcome = run_bounded(&self.policy, |tick| {
            attempts = tick.number;
            async move {
                match action.attempt(url, content, has_link).await {
                    ComposerStep::Posted => Step::Done(Ok(())),
                    ComposerStep::Failed(message) => Step::Done(Err(message)),
                    ComposerStep::NotReady => Step::Retry,
                }
            }
        })
        .await
        .unwrap_or_else(|| Err("Composer never became ready".to_string()));

        GroupReport {
            name: group.name.clone(),
            url: group.url.clone(),
            posted: outcome.is_ok(),
            attempts,
            error: outcome.err(),
        }
    }
}

// --- Browserless implementation ---

const FILL_SCRIPT: &str = r#"
export default async function ({ page, context }) {
  const sleep = (ms) => new Promise((r) => setTimeout(r, ms));
  await page.goto(context.url, { waitUntil: "networkidle2" });

  const opened = await page.evaluate(() => {
    const visible = (el) => el && el.offsetParent !== null && el.getBoundingClientRect().width > 20;
    const phrases = ["what's on your mind", "write something", "create a post", "write a post", "ask the group"];
    const editable = document.querySelector('[role="textbox"][contenteditable="true"], [data-lexical-editor="true"]');
    if (visible(editable)) return true;
    for (const el of document.querySelectorAll('[role="button"], [aria-label], span[dir="auto"]')) {
      const label = ((el.getAttribute("aria-label") || "") + " " + (el.textContent || "")).toLowerCase();
      if (visible(el) && phrases.some((p) => label.includes(p))) { el.click(); return true; }
    }
    return false;
  });
  if (!opened) return { data: { status: "not_ready" }, type: "application/json" };

  let editable = null;
  for (let i = 0; i < 24 && !editable; i++) {
    await sleep(400);
    editable = await page.$('[role="dialog"] [contenteditable="true"], [role="textbox"][contenteditable="true"]');
  }
  if (!editable) return { data: { status: "not_ready" }, type: "application/json" };

  await editable.focus();
  await page.evaluate((text) => document.execCommand("insertText", false, text), context.content);
  await sleep(context.hasLink ? 7000 : 1500);

  for (let i = 0; i < 25; i++) {
    const clicked = await page.evaluate(() => {
      const buttons = Array.from(document.querySelectorAll('[role="button"], button'));
      const post = buttons.find((b) => {
        const label = (b.getAttribute("aria-label") || "").toLowerCase().trim();
        const text = (b.textContent || "").toLowerCase().trim();
        if (b.offsetParent === null || label.includes("comment")) return false;
        return label === "post" || text === "post" || text === "publish" || text === "share";
      });
      if (!post) return false;
      post.click();
      return true;
    });
    if (clicked) {
      await sleep(2000);
      return { data: { status: "posted" }, type: "application/json" };
    }
    await sleep(400);
  }
  return { data: { status: "failed", detail: "Post button not found" }, type: "application/json" };
}
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FillContext<'a> {
    url: &'a str,
    content: &'a str,
    has_link: bool,
}

#[derive(Deserialize)]
struct FillResult {
    status: String,
    #[serde(default)]
    detail: Option<String>,
}

/// [`ComposerAction`] backed by a Browserless instance whose browser profile
/// is logged in to Facebook.
pub struct BrowserlessComposer {
    client: BrowserlessClient,
}

impl BrowserlessComposer {
    pub fn new(client: BrowserlessClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComposerAction for BrowserlessComposer {
    async fn attempt(&self, group_url: &str, content: &str, has_link: bool) -> ComposerStep {
        let context = FillContext {
            url: group_url,
            content,
            has_link,
        };
        match self.client.function::<_, FillResult>(FILL_SCRIPT, &context).await {
            Ok(result) => match result.status.as_str() {
                "posted" => ComposerStep::Posted,
                "not_ready" => ComposerStep::NotReady,
                _ => ComposerStep::Failed(
                    result.detail.unwrap_or_else(|| "Composer script failed".to_string()),
                ),
            },
            Err(e) => {
                warn!(group_url, error = %e, "Composer script call failed");
                ComposerStep::NotReady
            }
        }
    }
}
