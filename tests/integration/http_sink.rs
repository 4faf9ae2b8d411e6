//! HTTP sink against a mock OpenTSDB endpoint

use std::time::Duration;

use pretty_assertions::assert_eq;
use scollector::sink::{self, DrainOptions, HttpSink, Sink};
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_batch_posted_as_json_array() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/put"))
        .and(body_json(serde_json::json!([
            {"metric": "os.cpu", "timestamp": TEST_START, "value": 12, "tags": {"host": "agent01"}},
            {"metric": "os.mem.used", "timestamp": TEST_START, "value": 2048, "tags": {"host": "agent01"}}
        ])))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = HttpSink::new(&mock_server.uri()).unwrap();
    sink.send_batch(&[point("os.cpu", 12), point("os.mem.used", 2048)])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/put"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let sink = HttpSink::new(&mock_server.uri()).unwrap();
    let result = sink.send_batch(&[point("os.cpu", 1)]).await;
    assert!(result.is_err(), "500 should fail the batch");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_reported() {
    // nothing listens here
    let sink = HttpSink::new("http://127.0.0.1:9").unwrap();
    assert!(sink.send_batch(&[point("os.cpu", 1)]).await.is_err());
}

#[tokio::test]
async fn test_drain_batches_by_size() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/put"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (tx, rx) = mpsc::channel(16);
    for i in 0..5 {
        tx.send(point("app.hits", i)).await.unwrap();
    }
    drop(tx);

    let sink = HttpSink::new(&mock_server.uri()).unwrap();
    let stats = sink::drain(
        rx,
        &sink,
        DrainOptions {
            batch_size: 2,
            flush_interval: Duration::from_secs(60),
        },
    )
    .await;

    assert_eq!(stats.batches, 3);
    assert_eq!(stats.points, 5);
    assert_eq!(stats.failed_batches, 0);
}
