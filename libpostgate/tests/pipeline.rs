//! Integration tests for the publish and preview pipeline
//!
//! Exercises GateService end to end with mock platforms and with the
//! Telegram adapter writing to an in-memory outbox.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libpostgate::platforms::mock::MockPlatform;
use libpostgate::platforms::telegram::{OutboxApi, TelegramPlatform};
use libpostgate::types::{AuthMap, PreviewOutcome};
use libpostgate::{
    BodyFormat, Config, ContentConverter, GateService, MediaInput, PlatformRegistry,
    PostRequest, PostType, PublishOutcome,
};
use serde_json::{json, Value};

/// Writer whose buffer stays readable while the outbox owns a clone
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const CONFIG: &str = r#"
[channels.news]
platform = "telegram"
auth = { bot_token = "123456:ABC-def", chat_id = "@news" }
"#;

fn telegram_service() -> (GateService, SharedBuffer) {
    let outbox = SharedBuffer::default();
    let api = Arc::new(OutboxApi::new(outbox.clone()));
    let platforms = PlatformRegistry::new().with(Arc::new(TelegramPlatform::new(
        api,
        ContentConverter::default(),
    )));
    let config = Config::parse(CONFIG).unwrap();
    (GateService::from_config(&config, platforms).unwrap(), outbox)
}

fn mock_service(platform: MockPlatform) -> GateService {
    let platforms = PlatformRegistry::new().with(Arc::new(platform));
    GateService::from_config(&Config::default(), platforms).unwrap()
}

fn mock_request(body: &str) -> PostRequest {
    let mut request = PostRequest::new("mock", body);
    request.auth = Some(AuthMap::new());
    request
}

fn news_request(body: &str) -> PostRequest {
    let mut request = PostRequest::new("telegram", body);
    request.channel = Some("news".into());
    request
}

fn failure(outcome: &PublishOutcome) -> (&str, &str) {
    match outcome {
        PublishOutcome::Failed(e) => (&e.error.code, &e.error.message),
        PublishOutcome::Published(_) => panic!("expected a failure, got {:?}", outcome),
    }
}

#[tokio::test]
async fn test_markdown_post_through_telegram() {
    let (service, outbox) = telegram_service();
    let mut request = news_request("Hello **world**");
    request.body_format = BodyFormat::Markdown;

    let outcome = service.publish(&request).await;
    let PublishOutcome::Published(response) = outcome else {
        panic!("expected success");
    };
    assert_eq!(response.platform, "telegram");
    assert_eq!(response.post_type, PostType::Post);
    assert_eq!(response.post_id, "1");
    assert_eq!(response.url.as_deref(), Some("https://t.me/news/1"));

    let calls = outbox.lines();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["method"], json!("sendMessage"));
    assert_eq!(calls[0]["params"]["text"], json!("Hello <strong>world</strong>"));
    assert_eq!(calls[0]["params"]["parse_mode"], json!("HTML"));
    // The bot token never reaches the outbox
    assert!(!calls[0].to_string().contains("ABC-def"));
}

#[tokio::test]
async fn test_album_with_document_is_sent_as_media_group() {
    let (service, outbox) = telegram_service();
    let mut request = news_request("Trip photos");
    request.media = vec![
        MediaInput::url("https://example.com/1.jpg"),
        MediaInput::url("https://example.com/2.jpg"),
    ];
    request.document = Some(MediaInput::url("https://example.com/itinerary.pdf"));

    let preview = service.preview(&request).await;
    let PreviewOutcome::Previewed(preview) = preview else {
        panic!("expected a preview");
    };
    assert!(preview.data.valid);
    assert_eq!(preview.data.post_type, Some(PostType::Album));
    assert_eq!(
        preview.data.warnings,
        vec!["Fields 'document' are ignored for ALBUM posts".to_string()]
    );
    assert!(outbox.lines().is_empty());

    let outcome = service.publish(&request).await;
    assert!(outcome.is_success());

    let calls = outbox.lines();
    assert_eq!(calls[0]["method"], json!("sendMediaGroup"));
    assert_eq!(calls[0]["params"]["media"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_audio_and_video_are_rejected_before_dispatch() {
    let (service, outbox) = telegram_service();
    let mut request = news_request("hi");
    request.audio = Some(MediaInput::url("https://example.com/a.mp3"));
    request.video = Some(MediaInput::url("https://example.com/v.mp4"));

    let outcome = service.publish(&request).await;
    let (code, message) = failure(&outcome);
    assert_eq!(code, "VALIDATION_ERROR");
    assert_eq!(
        message,
        "Ambiguous media fields: cannot use 'audio' and 'video' together"
    );
    assert_eq!(outcome.exit_code(), 3);
    assert!(outbox.lines().is_empty());
}

#[tokio::test]
async fn test_unknown_channel() {
    let (service, _) = telegram_service();
    let mut request = news_request("hi");
    request.channel = Some("sports".into());

    let outcome = service.publish(&request).await;
    assert_eq!(failure(&outcome).0, "NOT_FOUND");
    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
async fn test_invalid_inline_credentials() {
    let (service, _) = telegram_service();
    let mut request = PostRequest::new("telegram", "hi");
    request.auth = Some(
        json!({ "bot_token": "not-a-token", "chat_id": "@news" })
            .as_object()
            .cloned()
            .unwrap(),
    );

    let outcome = service.publish(&request).await;
    let (code, message) = failure(&outcome);
    assert_eq!(code, "VALIDATION_ERROR");
    assert!(message.starts_with("Invalid credentials: bot_token"));
    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
async fn test_identical_retry_is_replayed() {
    let platform = MockPlatform::success("mock");
    let service = mock_service(platform.clone());
    let mut request = mock_request("hello");
    request.idempotency_key = Some("order-42".into());

    let first = service.publish(&request).await;
    let second = service.publish(&request).await;

    assert!(first.is_success());
    assert_eq!(first, second);
    assert_eq!(platform.publish_call_count(), 1);
}

#[tokio::test]
async fn test_changed_payload_with_same_key_is_a_new_request() {
    let platform = MockPlatform::success("mock");
    let service = mock_service(platform.clone());
    let mut request = mock_request("hello");
    request.idempotency_key = Some("order-42".into());

    let first = service.publish(&request).await;
    request.body = Some("hello again".into());
    let second = service.publish(&request).await;

    assert_ne!(first, second);
    assert_eq!(platform.publish_call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_duplicate_gets_conflict() {
    let platform = MockPlatform::with_delay("mock", Duration::from_millis(300));
    let service = mock_service(platform.clone());
    let mut request = mock_request("hello");
    request.idempotency_key = Some("order-7".into());

    let first = {
        let service = service.clone();
        let request = request.clone();
        tokio::spawn(async move { service.publish(&request).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let duplicate = service.publish(&request).await;
    let (code, message) = failure(&duplicate);
    assert_eq!(code, "CONFLICT");
    assert_eq!(message, "request already in progress");

    let first = first.await.unwrap();
    assert!(first.is_success());

    // Once completed, the same request replays the first response
    assert_eq!(service.publish(&request).await, first);
    assert_eq!(platform.publish_call_count(), 1);
}

#[tokio::test]
async fn test_requests_without_key_are_never_deduplicated() {
    let platform = MockPlatform::success("mock");
    let service = mock_service(platform.clone());
    let request = mock_request("hello");

    service.publish(&request).await;
    service.publish(&request).await;
    assert_eq!(platform.publish_call_count(), 2);
}

#[tokio::test]
async fn test_preview_never_publishes() {
    let platform = MockPlatform::success("mock");
    let service = mock_service(platform.clone());

    let outcome = service.preview(&mock_request("hello")).await;
    assert!(outcome.is_valid());
    assert_eq!(platform.publish_call_count(), 0);
    assert_eq!(platform.preview_call_count(), 1);
}
