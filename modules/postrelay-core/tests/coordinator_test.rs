//! Single-flight extraction: supersession, timeout, correlation and the
//! Draft update that follows a successful extraction.

use std::sync::Arc;
use std::time::Duration;

use postrelay_common::{
    ContextMessage, Draft, ExtractionFailure, ExtractionResult, PostRecord, RequestId,
};
use postrelay_core::testing::{MockDownloader, MockHost};
use postrelay_core::{RequestCoordinator, Store, DEFAULT_EXTRACTION_TIMEOUT};

struct Harness {
    host: Arc<MockHost>,
    downloader: Arc<MockDownloader>,
    store: Store,
    coordinator: RequestCoordinator,
}

fn harness() -> Harness {
    let host = Arc::new(MockHost::new());
    let downloader = Arc::new(MockDownloader::new());
    let store = Store::in_memory();
    let coordinator = RequestCoordinator::new(
        host.clone(),
        store.clone(),
        downloader.clone(),
        DEFAULT_EXTRACTION_TIMEOUT,
    );
    Harness {
        host,
        downloader,
        store,
        coordinator,
    }
}

fn record(post_id: &str) -> PostRecord {
    PostRecord {
        text: format!("post {post_id}"),
        post_id: Some(post_id.to_string()),
        has_video: true,
        ..Default::default()
    }
}

/// Let detached tasks (result pump, downloads) run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_frees_the_slot() {
    let h = harness();

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;
    assert!(!h.coordinator.is_idle().await);

    tokio::time::sleep(Duration::from_secs(50)).await;

    assert_eq!(pending.outcome().await, Err(ExtractionFailure::Timeout));
    assert!(h.coordinator.is_idle().await);
    assert_eq!(h.host.close_count(context), 1);
    assert_eq!(h.host.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn result_just_before_the_deadline_wins() {
    let h = harness();

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;

    tokio::time::sleep(Duration::from_secs(44)).await;
    assert!(h.host.complete(context, ExtractionResult::found("https://cdn/v1.mp4")));

    assert_eq!(pending.outcome().await, Ok("https://cdn/v1.mp4".to_string()));

    // The cancelled timer must not tear the context down a second time.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.host.close_count(context), 1);
}

#[tokio::test(start_paused = true)]
async fn newer_request_supersedes_the_pending_one() {
    let h = harness();

    let mut first = h.coordinator.start_extraction("url1", record("1"), false).await;
    let first_context = h.host.last_opened().unwrap().context;

    let second = h.coordinator.start_extraction("url2", record("2"), false).await;

    // The first caller is told before the second request resolves.
    assert_eq!(first.try_outcome(), Some(Err(ExtractionFailure::Superseded)));
    assert_eq!(h.host.close_count(first_context), 1);

    let opened = h.host.last_opened().unwrap();
    assert_eq!(opened.target_url, "url2");
    assert_eq!(opened.tag, second.request_id());

    h.host
        .complete(opened.context, ExtractionResult::found("https://cdn/v2.mp4"));
    assert_eq!(second.outcome().await, Ok("https://cdn/v2.mp4".to_string()));
    assert!(h.coordinator.is_idle().await);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_context_is_ever_open() {
    let h = harness();

    let a = h.coordinator.start_extraction("url1", record("1"), false).await;
    let b = h.coordinator.start_extraction("url2", record("2"), false).await;
    let c = h.coordinator.start_extraction("url3", record("3"), false).await;

    assert_eq!(h.host.max_live(), 1);
    assert_eq!(h.host.live_count(), 1);
    assert_eq!(a.outcome().await, Err(ExtractionFailure::Superseded));
    assert_eq!(b.outcome().await, Err(ExtractionFailure::Superseded));

    let pending = h.coordinator.pending_request().await.unwrap();
    assert_eq!(pending.request_id, c.request_id());
    assert_eq!(pending.target_url, "url3");
    assert_eq!(pending.post_id.as_deref(), Some("3"));
}

#[tokio::test(start_paused = true)]
async fn stale_results_are_dropped() {
    let h = harness();
    h.store.set_draft(&Draft::new(record("1"))).await.unwrap();

    let _first = h.coordinator.start_extraction("url1", record("1"), true).await;
    let first_context = h.host.last_opened().unwrap().context;
    let mut second = h.coordinator.start_extraction("url2", record("2"), true).await;
    let second_context = h.host.last_opened().unwrap().context;

    // Result from the superseded context.
    let late = h
        .host
        .message(first_context, ExtractionResult::found("https://cdn/old.mp4"))
        .unwrap();
    assert!(!h.coordinator.deliver(late).await);

    // Right context, wrong tag.
    let forged = ContextMessage {
        context: second_context,
        tag: RequestId::new(),
        result: ExtractionResult::found("https://cdn/forged.mp4"),
    };
    assert!(!h.coordinator.deliver(forged).await);

    settle().await;
    assert!(second.try_outcome().is_none());
    assert!(!h.coordinator.is_idle().await);
    let draft = h.store.draft().await.unwrap().unwrap();
    assert!(draft.record.video.is_none());
    assert!(h.downloader.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn result_after_timeout_is_dropped() {
    let h = harness();

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;
    tokio::time::sleep(Duration::from_secs(46)).await;
    assert_eq!(pending.outcome().await, Err(ExtractionFailure::Timeout));

    let late = h
        .host
        .message(context, ExtractionResult::found("https://cdn/v1.mp4"))
        .unwrap();
    assert!(!h.coordinator.deliver(late).await);
    assert_eq!(h.host.close_count(context), 1);
}

#[tokio::test(start_paused = true)]
async fn success_updates_matching_draft_and_records_download() {
    let h = harness();
    h.store.set_draft(&Draft::new(PostRecord {
        video: None,
        ..record("1")
    }))
    .await
    .unwrap();

    let pending = h
        .coordinator
        .start_extraction("https://x.com/i/status/1", record("1"), true)
        .await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::found("v1"));

    assert_eq!(pending.outcome().await, Ok("v1".to_string()));
    settle().await;

    let draft = h.store.draft().await.unwrap().unwrap();
    assert_eq!(draft.record.video.as_deref(), Some("v1"));
    assert!(draft.video_is_direct);
    assert!(draft.record.has_video);
    assert_eq!(draft.saved_folder_path.as_deref(), Some("mock/1"));
    assert_eq!(h.downloader.saved_videos(), vec!["v1"]);
}

#[tokio::test(start_paused = true)]
async fn success_for_another_post_leaves_draft_but_still_downloads() {
    let h = harness();
    let current = Draft::new(record("2"));
    h.store.set_draft(&current).await.unwrap();

    let pending = h.coordinator.start_extraction("url1", record("1"), true).await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::found("v1"));

    assert_eq!(pending.outcome().await, Ok("v1".to_string()));
    settle().await;

    assert_eq!(h.store.draft().await.unwrap().unwrap(), current);
    assert_eq!(h.downloader.saved_videos(), vec!["v1"]);
}

#[tokio::test(start_paused = true)]
async fn draft_replaced_after_extraction_keeps_new_post_intact() {
    let h = harness();
    h.store.set_draft(&Draft::new(record("1"))).await.unwrap();

    let pending = h.coordinator.start_extraction("url1", record("1"), true).await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::found("v1"));
    assert!(pending.outcome().await.is_ok());

    // The user moves on while the detached download may still be running.
    let next = Draft::new(record("2"));
    h.store.set_draft(&next).await.unwrap();
    settle().await;

    let draft = h.store.draft().await.unwrap().unwrap();
    assert_eq!(draft.post_id(), Some("2"));
    assert!(draft.saved_folder_path.is_none());
}

#[tokio::test(start_paused = true)]
async fn without_update_existing_nothing_is_written() {
    let h = harness();
    h.store.set_draft(&Draft::new(record("1"))).await.unwrap();

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::found("v1"));

    assert_eq!(pending.outcome().await, Ok("v1".to_string()));
    settle().await;

    assert!(h.store.draft().await.unwrap().unwrap().record.video.is_none());
    assert!(h.downloader.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn automator_failures_become_structured_outcomes() {
    let h = harness();

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::failed("Tweet not found"));
    assert_eq!(
        pending.outcome().await,
        Err(ExtractionFailure::SiteError("Tweet not found".into()))
    );

    let pending = h.coordinator.start_extraction("url1", record("1"), false).await;
    let context = h.host.last_opened().unwrap().context;
    h.host.complete(context, ExtractionResult::failed("Timeout"));
    assert_eq!(pending.outcome().await, Err(ExtractionFailure::Timeout));
}

#[tokio::test(start_paused = true)]
async fn failing_to_open_a_context_resolves_immediately() {
    let h = harness();
    h.host.set_fail_open(true);

    let mut pending = h.coordinator.start_extraction("url1", record("1"), false).await;

    match pending.try_outcome() {
        Some(Err(ExtractionFailure::SiteError(message))) => {
            assert!(message.contains("browser unavailable"))
        }
        other => panic!("expected site error, got {other:?}"),
    }
    assert!(h.coordinator.is_idle().await);
    assert!(h.host.opened().is_empty());
}
