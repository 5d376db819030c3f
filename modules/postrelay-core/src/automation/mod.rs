//! Browser automation: automators that drive third-party pages, the retry
//! loop they share, and the host that runs them as isolated contexts.

pub mod composer;
pub mod host;
pub mod retry;
pub mod site;

use async_trait::async_trait;
use tokio::sync::mpsc;

use postrelay_common::{ContextId, ContextMessage, ExtractionResult, RequestId};

pub use composer::{
    build_post_content, BrowserlessComposer, ComposerAction, ComposerStep, GroupPoster,
    GroupReport,
};
pub use host::TaskHost;
pub use retry::{AttemptTick, RetryPolicy, Step};
pub use site::{BrowserlessSite, SiteAutomator, SiteBrowser};

/// Channel automation contexts post their terminal result on.
pub type ResultSink = mpsc::UnboundedSender<ContextMessage>;

/// Resolves a post URL to a downloadable video URL.
#[async_trait]
pub trait Automator: Send + Sync {
    /// Always returns a result; transport problems become `success = false`.
    async fn run(&self, target_url: &str) -> ExtractionResult;
}

/// Opens and tears down automation contexts.
#[async_trait]
pub trait AutomationHost: Send + Sync {
    /// Open a context for `target_url`, tagged with `tag`. The context posts
    /// exactly one [`ContextMessage`] carrying the tag on `sink` when it finishes.
    async fn open(&self, target_url: &str, tag: RequestId, sink: ResultSink)
        -> anyhow::Result<ContextId>;

    /// Tear down a context. Returns false if it was already gone.
    async fn close(&self, context: ContextId) -> bool;
}
