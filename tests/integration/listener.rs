//! Push listener over a real socket

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use scollector::{Collector, StreamSpec, dispatch, listener::spawn_listener, tags::TsdbValidator};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test]
async fn test_pushed_points_reach_output() {
    let cancel = CancellationToken::new();
    let (addr, inbound) = spawn_listener(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(TsdbValidator),
        cancel.clone(),
    )
    .await
    .unwrap();

    let collector = Collector::stream("listener", StreamSpec::from_receiver(inbound));
    let (mut rx, handle) = dispatch::run(vec![collector], test_context(false), cancel.clone(), 64);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/put"))
        .json(&serde_json::json!([
            {"metric": "app.signups", "timestamp": 1, "value": 3, "tags": {"plan": "pro"}}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let dp = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dp.metric, "app.signups");
    assert_eq!(dp.tags.get("plan"), Some("pro"));
    assert_eq!(dp.tags.get("host"), Some("agent01"));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_invalid_push_rejected() {
    let cancel = CancellationToken::new();
    let (addr, _inbound) = spawn_listener(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(TsdbValidator),
        cancel.clone(),
    )
    .await
    .unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/put"))
        .json(&serde_json::json!({"metric": "no spaces allowed", "timestamp": 1, "value": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    cancel.cancel();
}
