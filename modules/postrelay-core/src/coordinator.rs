// Request coordinator: single-flight extraction with supersession, timeout,
// and result correlation.
//
// At most one extraction is pending. Starting another evicts the occupant
// (its caller gets `Superseded` right away and its context is closed). The
// pending request resolves exactly once: a matching result, the timeout,
// or eviction. Results are matched on both the context id and the request tag
// the context was opened with. Anything else is stale and dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use postrelay_common::{
    ContextId, ContextMessage, ExtractionFailure, ExtractionOutcome, ExtractionRequest,
    ExtractionResult, PostRecord, RequestId,
};

use crate::automation::site::EXHAUSTED_ERROR;
use crate::automation::{AutomationHost, ResultSink};
use crate::downloader::{spawn_save, Downloader};
use crate::store::Store;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(45);

struct PendingSlot {
    request: ExtractionRequest,
    context: ContextId,
    responder: oneshot::Sender<ExtractionOutcome>,
    timer: JoinHandle<()>,
}

/// Public view of the occupied slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub request_id: RequestId,
    pub context: ContextId,
    pub target_url: String,
    pub post_id: Option<String>,
    pub update_existing: bool,
    pub created_at: DateTime<Utc>,
}

/// Caller's handle on a started extraction.
pub struct PendingExtraction {
    request_id: RequestId,
    rx: oneshot::Receiver<ExtractionOutcome>,
}

impl PendingExtraction {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> ExtractionOutcome {
        self.rx.await.unwrap_or_else(|_| Err(abandoned()))
    }

    /// The outcome if it has already been delivered.
    pub fn try_outcome(&mut self) -> Option<ExtractionOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

fn abandoned() -> ExtractionFailure {
    ExtractionFailure::SiteError("Extraction was abandoned".to_string())
}

#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn AutomationHost>,
    store: Store,
    downloader: Arc<dyn Downloader>,
    timeout: Duration,
    slot: Mutex<Option<PendingSlot>>,
    sink: ResultSink,
}

impl RequestCoordinator {
    /// Must be called inside a Tokio runtime: it spawns the task that feeds
    /// context results back into [`RequestCoordinator::deliver`].
    pub fn new(
        host: Arc<dyn AutomationHost>,
        store: Store,
        downloader: Arc<dyn Downloader>,
        timeout: Duration,
    ) -> Self {
        let (sink, mut results) = mpsc::unbounded_channel::<ContextMessage>();
        let inner = Arc::new(Inner {
            host,
            store,
            downloader,
            timeout,
            slot: Mutex::new(None),
            sink,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(message) = results.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                RequestCoordinator { inner }.deliver(message).await;
            }
            debug!("Coordinator result pump stopped");
        });

        Self { inner }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.slot.lock().await.is_none()
    }

    pub async fn pending_request(&self) -> Option<PendingSummary> {
        self.inner.slot.lock().await.as_ref().map(|p| PendingSummary {
            request_id: p.request.request_id,
            context: p.context,
            target_url: p.request.target_url.clone(),
            post_id: p.request.initial_record.post_id.clone(),
            update_existing: p.request.update_existing,
            created_at: p.request.created_at,
        })
    }

    /// Start resolving the video behind `target_url`, superseding whatever
    /// is pending. Never fails: problems arrive through the returned handle.
    pub async fn start_extraction(
        &self,
        target_url: &str,
        initial_record: PostRecord,
        update_existing: bool,
    ) -> PendingExtraction {
        let request = ExtractionRequest::new(target_url, initial_record, update_existing);
        let request_id = request.request_id;
        let (responder, rx) = oneshot::channel();

        let mut slot = self.inner.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!(
                superseded = %previous.request.request_id,
                by = %request_id,
                "Superseding pending extraction"
            );
            previous.timer.abort();
            self.inner.host.close(previous.context).await;
            let _ = previous.responder.send(Err(ExtractionFailure::Superseded));
        }

        match self
            .inner
            .host
            .open(target_url, request_id, self.inner.sink.clone())
            .await
        {
            Ok(context) => {
                info!(
                    %request_id,
                    %context,
                    target_url,
                    post_id = ?request.initial_record.post_id,
                    update_existing,
                    "Extraction started"
                );
                let timer = self.arm_timer(request_id);
                *slot = Some(PendingSlot {
                    request,
                    context,
                    responder,
                    timer,
                });
            }
            Err(e) => {
                warn!(%request_id, target_url, error = %e, "Failed to open automation context");
                let _ = responder.send(Err(ExtractionFailure::SiteError(format!(
                    "Could not start automation: {e:#}"
                ))));
            }
        }

        PendingExtraction { request_id, rx }
    }

    fn arm_timer(&self, request_id: RequestId) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                RequestCoordinator { inner }.expire(request_id).await;
            }
        })
    }

    async fn expire(&self, request_id: RequestId) {
        let mut slot = self.inner.slot.lock().await;
        if !slot
            .as_ref()
            .is_some_and(|p| p.request.request_id == request_id)
        {
            return;
        }
        let Some(pending) = slot.take() else {
            return;
        };

        warn!(%request_id, context = %pending.context, "Extraction timed out");
        // Running inside the timer task itself; dropping the handle detaches it.
        drop(pending.timer);
        self.inner.host.close(pending.context).await;
        let _ = pending.responder.send(Err(ExtractionFailure::Timeout));
    }

    /// Route a context's result to the pending caller. Returns false when the
    /// message is stale (wrong context, wrong tag, or nothing pending).
    pub async fn deliver(&self, message: ContextMessage) -> bool {
        let mut slot = self.inner.slot.lock().await;
        let current = slot
            .as_ref()
            .is_some_and(|p| p.context == message.context && p.request.request_id == message.tag);
        if !current {
            warn!(
                context = %message.context,
                tag = %message.tag,
                "Dropping stale extraction result"
            );
            return false;
        }
        let Some(pending) = slot.take() else {
            return false;
        };
        pending.timer.abort();
        self.inner.host.close(pending.context).await;
        drop(slot);

        let outcome = outcome_from(message.result);
        match outcome {
            Ok(ref video_url) => {
                info!(request_id = %pending.request.request_id, video_url = video_url.as_str(), "Extraction succeeded");
                self.apply_success(&pending.request, video_url).await;
            }
            Err(ref failure) => {
                warn!(request_id = %pending.request.request_id, reason = failure.reason(), error = %failure, "Extraction failed");
            }
        }

        let _ = pending.responder.send(outcome);
        true
    }

    /// Fold the resolved video into the Draft if it is still the same post,
    /// and save the video in the background either way.
    async fn apply_success(&self, request: &ExtractionRequest, video_url: &str) {
        if !request.update_existing {
            return;
        }
        let post_id = request.initial_record.post_id.clone();

        match self
            .inner
            .store
            .update_draft_if(post_id.as_deref(), |draft| {
                draft.record.video = Some(video_url.to_string());
                draft.record.has_video = true;
                draft.video_is_direct = true;
            })
            .await
        {
            Ok(true) => info!(?post_id, "Draft updated with extracted video"),
            Ok(false) => info!(?post_id, "Draft moved to another post, leaving it unchanged"),
            Err(e) => warn!(?post_id, error = %e, "Failed to update draft with extracted video"),
        }

        let record = PostRecord {
            video: Some(video_url.to_string()),
            has_video: true,
            ..request.initial_record.clone()
        };
        spawn_save(self.inner.downloader.clone(), self.inner.store.clone(), record);
    }
}

fn outcome_from(result: ExtractionResult) -> ExtractionOutcome {
    if result.success {
        return match result.video_url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ExtractionFailure::SiteError(
                "Extraction reported success without a video URL".to_string(),
            )),
        };
    }
    match result.error {
        Some(ref error) if error == EXHAUSTED_ERROR => Err(ExtractionFailure::Timeout),
        Some(error) => Err(ExtractionFailure::SiteError(error)),
        None => Err(ExtractionFailure::SiteError("Unknown extraction error".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_automator_maps_to_timeout() {
        assert_eq!(
            outcome_from(ExtractionResult::failed("Timeout")),
            Err(ExtractionFailure::Timeout)
        );
    }

    #[test]
    fn success_without_url_is_a_site_error() {
        let result = ExtractionResult {
            success: true,
            video_url: None,
            error: None,
        };
        assert!(matches!(outcome_from(result), Err(ExtractionFailure::SiteError(_))));
    }

    #[test]
    fn site_error_text_is_kept() {
        assert_eq!(
            outcome_from(ExtractionResult::failed("Tweet not found")),
            Err(ExtractionFailure::SiteError("Tweet not found".into()))
        );
        assert_eq!(
            outcome_from(ExtractionResult::found("v1")),
            Ok("v1".to_string())
        );
    }
}
