//! Ingest server integration tests
//!
//! Drives the router with `tower::ServiceExt::oneshot` and checks what the
//! queue consumer does with the published messages.

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use mqtt2influx::config::Config;
use mqtt2influx::error::SinkError;
use mqtt2influx::metrics::PipelineStats;
use mqtt2influx::pipeline::Pipeline;
use mqtt2influx::server::{self, AppState};
use mqtt2influx::sink::RecordSink;
use mqtt2influx::source::{IncomingMessage, MessageQueue, QueueItem};
use mqtt2influx::transformer::{FieldValue, RuleEngine, RuleSet, WriteRecord};
use tokio::sync::mpsc;
use tower::ServiceExt;

const CONFIG: &str = r#"
mqtt:
  prefix: site
rules:
  - topic: "home/+room/temperature"
    measurement: temperature
    payload:
      field: true
      type: float
    tokens:
      room:
        tag: true
"#;

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<WriteRecord>>,
}

impl RecordSink for RecordingSink {
    async fn write(&self, record: &WriteRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Harness {
    state: AppState,
    engine: Arc<RuleEngine>,
    receiver: mpsc::Receiver<QueueItem>,
}

fn harness() -> Harness {
    let config = Config::from_yaml(CONFIG).unwrap();
    let engine = Arc::new(RuleEngine::new(RuleSet::from_config(config.rules())));
    let (sender, receiver) = MessageQueue::bounded(16);
    let source = server::subscribe_all(&config, &engine, sender);

    Harness {
        state: AppState {
            config: Arc::new(config),
            source: Arc::new(source),
            stats: Arc::new(PipelineStats::new()),
        },
        engine,
        receiver,
    }
}

fn publish_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/publish")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness();
    let response = server::router(h.state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_root_lists_subscriptions() {
    let h = harness();
    let response = server::router(h.state)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("site/home/+/temperature"));
    assert!(html.contains("Sink: log only"));
    assert!(html.contains("Queue capacity: 10000"));
}

#[tokio::test]
async fn test_publish_matching_topic_is_queued() {
    let mut h = harness();
    let response = server::router(h.state)
        .oneshot(publish_request(serde_json::json!({
            "topic": "site/home/kitchen/temperature",
            "payload": "21.5",
            "retain": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], true);

    assert_eq!(
        h.receiver.recv().await,
        Some(QueueItem::Message(
            IncomingMessage::new("home/kitchen/temperature", "21.5").with_retain(true)
        ))
    );
}

#[tokio::test]
async fn test_publish_unmatched_topic_is_ignored() {
    let mut h = harness();
    let response = server::router(h.state)
        .oneshot(publish_request(serde_json::json!({
            "topic": "site/garage/door",
            "payload": "open"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], false);
    assert!(h.receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_publish_outside_prefix_is_rejected() {
    let h = harness();
    let response = server::router(h.state)
        .oneshot(publish_request(serde_json::json!({
            "topic": "home/kitchen/temperature",
            "payload": "21.5"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_publish_after_consumer_stopped() {
    let h = harness();
    drop(h.receiver);

    let response = server::router(h.state)
        .oneshot(publish_request(serde_json::json!({
            "topic": "site/home/kitchen/temperature",
            "payload": "21.5"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_published_messages_reach_the_sink() {
    let h = harness();
    let sink = Arc::new(RecordingSink::default());
    let consumer = Pipeline::new(Arc::clone(&h.engine), Arc::clone(&sink), h.receiver)
        .with_stats(Arc::clone(&h.state.stats))
        .spawn();

    let app = server::router(h.state.clone());
    for (room, value) in [("kitchen", "21.5"), ("hall", "19")] {
        let response = app
            .clone()
            .oneshot(publish_request(serde_json::json!({
                "topic": format!("site/home/{}/temperature", room),
                "payload": value
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    h.state.source.shutdown().await.unwrap();
    consumer.await.unwrap();

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].measurement.as_deref(), Some("temperature"));
    assert_eq!(records[0].tags["room"], "kitchen");
    assert_eq!(records[0].fields["payload"], FieldValue::Float(21.5));
    assert_eq!(records[1].tags["room"], "hall");
    assert_eq!(records[1].fields["payload"], FieldValue::Float(19.0));

    let response = app
        .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["received"], 2);
    assert_eq!(stats["written"], 2);
    assert_eq!(stats["rules"]["home/+room/temperature"]["records"], 2);
}
