//! Recording fakes for the relay's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use graph_client::{GraphError, GraphPost, PageToken, VideoSource};
use postrelay_common::{
    ContextId, ContextMessage, DownloadReport, ExtractionResult, PostRecord, RequestId,
};

use crate::automation::{AutomationHost, ComposerAction, ComposerStep, ResultSink};
use crate::downloader::Downloader;
use crate::publisher::GraphApi;

// --- Automation host ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedContext {
    pub context: ContextId,
    pub target_url: String,
    pub tag: RequestId,
}

/// Host whose contexts never finish on their own; tests complete them.
pub struct MockHost {
    opened: Mutex<Vec<OpenedContext>>,
    closed: Mutex<Vec<ContextId>>,
    sinks: Mutex<HashMap<ContextId, ResultSink>>,
    live: Mutex<HashSet<ContextId>>,
    max_live: AtomicUsize,
    fail_open: AtomicBool,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            sinks: Mutex::new(HashMap::new()),
            live: Mutex::new(HashSet::new()),
            max_live: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<OpenedContext> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last_opened(&self) -> Option<OpenedContext> {
        self.opened.lock().unwrap().last().cloned()
    }

    /// Every close call, including repeated ones.
    pub fn closed(&self) -> Vec<ContextId> {
        self.closed.lock().unwrap().clone()
    }

    pub fn close_count(&self, context: ContextId) -> usize {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == context)
            .count()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Most contexts ever open at the same time.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// The message `context` would post for `result`.
    pub fn message(&self, context: ContextId, result: ExtractionResult) -> Option<ContextMessage> {
        let opened = self.opened.lock().unwrap();
        let tag = opened.iter().find(|o| o.context == context)?.tag;
        Some(ContextMessage {
            context,
            tag,
            result,
        })
    }

    /// Post `result` from `context` through the sink it was opened with,
    /// whether or not it has been closed since.
    pub fn complete(&self, context: ContextId, result: ExtractionResult) -> bool {
        let Some(message) = self.message(context, result) else {
            return false;
        };
        let sinks = self.sinks.lock().unwrap();
        sinks
            .get(&context)
            .is_some_and(|sink| sink.send(message).is_ok())
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AutomationHost for MockHost {
    async fn open(
        &self,
        target_url: &str,
        tag: RequestId,
        sink: ResultSink,
    ) -> anyhow::Result<ContextId> {
        if self.fail_open.load(Ordering::SeqCst) {
            anyhow::bail!("browser unavailable");
        }
        let context = ContextId::new();
        self.opened.lock().unwrap().push(OpenedContext {
            context,
            target_url: target_url.to_string(),
            tag,
        });
        self.sinks.lock().unwrap().insert(context, sink);

        let mut live = self.live.lock().unwrap();
        live.insert(context);
        self.max_live.fetch_max(live.len(), Ordering::SeqCst);
        Ok(context)
    }

    async fn close(&self, context: ContextId) -> bool {
        self.closed.lock().unwrap().push(context);
        self.live.lock().unwrap().remove(&context)
    }
}

// --- Downloader ---

/// Reports a save into `mock/<post id>` for any record with a video.
pub struct MockDownloader {
    saves: Mutex<Vec<PostRecord>>,
    fail: AtomicBool,
    stall: AtomicBool,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self {
            saves: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            stall: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let downloader = Self::new();
        downloader.fail.store(true, Ordering::SeqCst);
        downloader
    }

    /// Every save hangs forever, like a media host that never answers.
    pub fn stalled() -> Self {
        let downloader = Self::new();
        downloader.stall.store(true, Ordering::SeqCst);
        downloader
    }

    pub fn saves(&self) -> Vec<PostRecord> {
        self.saves.lock().unwrap().clone()
    }

    /// Videos of records that carried one.
    pub fn saved_videos(&self) -> Vec<String> {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.video.clone())
            .collect()
    }
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn save(&self, record: &PostRecord) -> DownloadReport {
        self.saves.lock().unwrap().push(record.clone());
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if record.video.is_none() {
            return DownloadReport::skipped("no_video");
        }
        if self.fail.load(Ordering::SeqCst) {
            return DownloadReport::skipped("mock failure");
        }
        let id = record.post_id.as_deref().unwrap_or("unknown");
        DownloadReport::saved(format!("mock/{id}"))
    }
}

// --- Graph API ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphCall {
    Feed {
        message: String,
        attached_media: Vec<String>,
    },
    Photo {
        message: String,
        image_url: String,
    },
    Upload {
        image_url: String,
        index: usize,
    },
    VideoByUrl {
        description: String,
        file_url: String,
    },
    VideoUpload {
        description: String,
        bytes: usize,
        filename: String,
    },
}

/// Records every call. Uploads return `photo_<index>`.
pub struct MockGraph {
    calls: Mutex<Vec<GraphCall>>,
    fail_upload_at: Mutex<Option<usize>>,
    fail_message: Mutex<Option<String>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_upload_at: Mutex::new(None),
            fail_message: Mutex::new(None),
        }
    }

    /// Every call fails with this vendor message.
    pub fn failing_with(message: &str) -> Self {
        let graph = Self::new();
        *graph.fail_message.lock().unwrap() = Some(message.to_string());
        graph
    }

    /// The unpublished upload with this index fails.
    pub fn fail_upload_at(&self, index: usize) {
        *self.fail_upload_at.lock().unwrap() = Some(index);
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: GraphCall) -> graph_client::Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.fail_message.lock().unwrap().clone() {
            Some(message) => Err(GraphError::Api {
                status: 400,
                message,
            }),
            None => Ok(()),
        }
    }

    fn post(id: &str) -> GraphPost {
        GraphPost {
            id: Some(id.to_string()),
            post_id: None,
        }
    }
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn post_feed(
        &self,
        _page: &PageToken,
        message: &str,
        attached_media: &[String],
    ) -> graph_client::Result<GraphPost> {
        self.record(GraphCall::Feed {
            message: message.to_string(),
            attached_media: attached_media.to_vec(),
        })?;
        Ok(Self::post("page_feed_post"))
    }

    async fn post_photo(
        &self,
        _page: &PageToken,
        message: &str,
        image_url: &str,
    ) -> graph_client::Result<GraphPost> {
        self.record(GraphCall::Photo {
            message: message.to_string(),
            image_url: image_url.to_string(),
        })?;
        Ok(GraphPost {
            id: Some("photo".to_string()),
            post_id: Some("page_photo_post".to_string()),
        })
    }

    async fn upload_unpublished_photo(
        &self,
        _page: &PageToken,
        image_url: &str,
        index: usize,
    ) -> graph_client::Result<String> {
        self.record(GraphCall::Upload {
            image_url: image_url.to_string(),
            index,
        })?;
        if *self.fail_upload_at.lock().unwrap() == Some(index) {
            return Err(GraphError::Api {
                status: 400,
                message: "Invalid image URL".to_string(),
            });
        }
        Ok(format!("photo_{index}"))
    }

    async fn post_video(
        &self,
        _page: &PageToken,
        description: &str,
        source: VideoSource,
    ) -> graph_client::Result<GraphPost> {
        let call = match source {
            VideoSource::Url(file_url) => GraphCall::VideoByUrl {
                description: description.to_string(),
                file_url,
            },
            VideoSource::Upload { bytes, filename } => GraphCall::VideoUpload {
                description: description.to_string(),
                bytes: bytes.len(),
                filename,
            },
        };
        self.record(call)?;
        Ok(Self::post("page_video"))
    }
}

// --- Group composer ---

/// Posts on the first attempt and records where.
pub struct MockComposer {
    attempts: Mutex<Vec<(String, String)>>,
}

impl MockComposer {
    pub fn new() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// `(group url, content)` per attempt.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Default for MockComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComposerAction for MockComposer {
    async fn attempt(&self, group_url: &str, content: &str, _has_link: bool) -> ComposerStep {
        self.attempts
            .lock()
            .unwrap()
            .push((group_url.to_string(), content.to_string()));
        ComposerStep::Posted
    }
}
