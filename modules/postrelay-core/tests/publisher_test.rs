use std::sync::Arc;

use postrelay_common::{Credentials, PublishFailure, PublishRequest};
use postrelay_core::testing::{GraphCall, MockGraph};
use postrelay_core::Publisher;

fn credentials() -> Credentials {
    Credentials {
        page_id: "105".to_string(),
        access_token: "token".to_string(),
    }
}

fn request(images: &[&str]) -> PublishRequest {
    PublishRequest {
        message: "hello".to_string(),
        images: images.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn several_images_upload_unpublished_then_post_once() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());

    let post_id = publisher
        .publish(&credentials(), &request(&["img-a", "img-b", "img-c"]))
        .await
        .unwrap();

    assert_eq!(post_id.as_deref(), Some("page_feed_post"));
    let calls = graph.calls();
    assert_eq!(calls.len(), 4);

    let mut uploads: Vec<(String, usize)> = calls[..3]
        .iter()
        .map(|c| match c {
            GraphCall::Upload { image_url, index } => (image_url.clone(), *index),
            other => panic!("expected upload, got {other:?}"),
        })
        .collect();
    uploads.sort_by_key(|(_, index)| *index);
    assert_eq!(
        uploads,
        vec![
            ("img-a".to_string(), 0),
            ("img-b".to_string(), 1),
            ("img-c".to_string(), 2),
        ]
    );

    assert_eq!(
        calls[3],
        GraphCall::Feed {
            message: "hello".to_string(),
            attached_media: vec!["photo_0".into(), "photo_1".into(), "photo_2".into()],
        }
    );
}

#[tokio::test]
async fn missing_credentials_fail_before_any_call() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());

    let err = publisher
        .publish(&Credentials::default(), &request(&["img-a"]))
        .await
        .unwrap_err();

    assert_eq!(err, PublishFailure::MissingCredentials);
    assert_eq!(err.reason(), "missing_credentials");
    assert!(graph.calls().is_empty());
}

#[tokio::test]
async fn text_only_posts_to_feed() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());

    publisher.publish(&credentials(), &request(&[])).await.unwrap();

    assert_eq!(
        graph.calls(),
        vec![GraphCall::Feed {
            message: "hello".to_string(),
            attached_media: vec![],
        }]
    );
}

#[tokio::test]
async fn single_image_is_a_photo_post() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());

    let post_id = publisher
        .publish(&credentials(), &request(&["img-a"]))
        .await
        .unwrap();

    assert_eq!(post_id.as_deref(), Some("page_photo_post"));
    assert_eq!(
        graph.calls(),
        vec![GraphCall::Photo {
            message: "hello".to_string(),
            image_url: "img-a".to_string(),
        }]
    );
}

#[tokio::test]
async fn video_takes_priority_over_images() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());
    let request = PublishRequest {
        video: Some("https://cdn.example.com/v.mp4".to_string()),
        ..request(&["img-a", "img-b"])
    };

    publisher.publish(&credentials(), &request).await.unwrap();

    assert_eq!(
        graph.calls(),
        vec![GraphCall::VideoByUrl {
            description: "hello".to_string(),
            file_url: "https://cdn.example.com/v.mp4".to_string(),
        }]
    );
}

#[tokio::test]
async fn inline_video_is_uploaded_as_multipart_source() {
    let graph = Arc::new(MockGraph::new());
    let publisher = Publisher::new(graph.clone());
    let request = PublishRequest {
        video: Some("data:video/mp4;base64,AAECAw==".to_string()),
        video_is_inline: true,
        ..request(&[])
    };

    publisher.publish(&credentials(), &request).await.unwrap();

    assert_eq!(
        graph.calls(),
        vec![GraphCall::VideoUpload {
            description: "hello".to_string(),
            bytes: 4,
            filename: "video.mp4".to_string(),
        }]
    );
}

#[tokio::test]
async fn failed_upload_skips_the_feed_post() {
    let graph = Arc::new(MockGraph::new());
    graph.fail_upload_at(1);
    let publisher = Publisher::new(graph.clone());

    let err = publisher
        .publish(&credentials(), &request(&["img-a", "img-b", "img-c"]))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "partial_multi_upload_failure");
    assert_eq!(err.to_string(), "Failed to upload photo 2: Invalid image URL");
    assert!(!graph
        .calls()
        .iter()
        .any(|c| matches!(c, GraphCall::Feed { .. })));
}

#[tokio::test]
async fn vendor_error_message_is_surfaced() {
    let graph = Arc::new(MockGraph::failing_with("Invalid OAuth access token."));
    let publisher = Publisher::new(graph);

    let err = publisher
        .publish(&credentials(), &request(&[]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PublishFailure::Http {
            message: "Invalid OAuth access token.".to_string()
        }
    );
}
