//! End-to-end tests: registry -> dispatch -> shared channel -> sink

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use scollector::{
    Collected, Collector, ContinuousSpec, DataPoint, PoolTask, Registry, RateType, StreamSpec,
    TagSet, TelemetryContext,
    collector::stats::{DURATION_METRIC, ERROR_METRIC},
    config::TagOverrideConfig,
    dispatch,
    metadata::unit,
    sink::{self, DrainOptions, Sink},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_selected_collectors_emit_with_default_tags() {
    let mut registry = Registry::new();
    registry
        .register(gauge_collector("alpha", Duration::from_secs(1)))
        .unwrap();
    registry
        .register(gauge_collector("beta", Duration::from_secs(1)))
        .unwrap();

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(
        registry.search(&["alp"]),
        test_context(true),
        cancel.clone(),
        256,
    );
    assert_eq!(handle.names(), vec!["alpha"]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let points = drain_now(&mut rx);

    let values: Vec<&DataPoint> = points.iter().filter(|p| p.metric == "alpha.value").collect();
    assert_eq!(values.len(), 3);
    for dp in &values {
        assert_eq!(dp.tags, TagSet::from([("host", "agent01"), ("dc", "test")]));
        assert_eq!(dp.timestamp, TEST_START);
    }
    assert!(!points.iter().any(|p| p.metric.starts_with("beta")));

    let durations: Vec<&DataPoint> = points.iter().filter(|p| p.metric == DURATION_METRIC).collect();
    assert_eq!(durations.len(), 3);
    assert_eq!(durations[0].tags.get("collector"), Some("alpha"));
    assert_eq!(durations[0].tags.get("os"), Some(std::env::consts::OS));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_tag_overrides_only_touch_matching_collector() {
    let mut registry = Registry::new();
    registry
        .register(gauge_collector("alpha", Duration::from_secs(1)))
        .unwrap();
    registry
        .register(gauge_collector("beta", Duration::from_secs(1)))
        .unwrap();
    registry
        .apply_tag_overrides(&[TagOverrideConfig {
            collector_expr: "^alpha$".to_string(),
            matched_tags: BTreeMap::new(),
            tags: TagSet::from([("dc", ""), ("team", "infra")]),
        }])
        .unwrap();

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(
        registry.search::<&str>(&[]),
        test_context(false),
        cancel.clone(),
        64,
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    let points = drain_now(&mut rx);

    let alpha = points.iter().find(|p| p.metric == "alpha.value").unwrap();
    let beta = points.iter().find(|p| p.metric == "beta.value").unwrap();
    assert_eq!(alpha.tags, TagSet::from([("host", "agent01"), ("team", "infra")]));
    assert_eq!(beta.tags, TagSet::from([("host", "agent01"), ("dc", "test")]));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_pool_subtasks_follow_their_own_schedules() {
    let task = |name: &'static str, secs: u64| {
        PoolTask::new(
            name,
            Duration::from_secs(secs),
            move |ctx: Arc<TelemetryContext>| async move {
                let mut md = vec![];
                ctx.add(&mut md, name, 1, None, RateType::Gauge, unit::NONE, "");
                Collected::ok(md)
            },
        )
    };
    let collector = Collector::continuous(
        "pool",
        ContinuousSpec::pool(2, vec![task("fast", 1), task("slow", 5)]),
    );

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(vec![collector], test_context(false), cancel.clone(), 256);
    tokio::time::sleep(Duration::from_millis(5500)).await;
    let points = drain_now(&mut rx);

    let fast = points.iter().filter(|p| p.metric == "fast").count();
    let slow = points.iter().filter(|p| p.metric == "slow").count();
    assert!(slow >= 1, "slow ran {slow} times");
    assert!(fast > slow, "fast ran {fast} times, slow {slow}");

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_stream_batches_forwarded() {
    let (in_tx, in_rx) = mpsc::channel(8);
    let collector = Collector::stream("push", StreamSpec::from_receiver(in_rx));

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(vec![collector], test_context(false), cancel.clone(), 64);

    let mut pushed = point("app.requests", 7);
    pushed.tags = TagSet::new();
    in_tx.send(vec![pushed]).await.unwrap();

    let dp = rx.recv().await.unwrap();
    assert_eq!(dp.metric, "app.requests");
    assert_eq!(dp.tags.get("host"), Some("agent01"));
    assert_eq!(dp.tags.get("dc"), Some("test"));

    cancel.cancel();
    handle.join().await;
}

#[derive(Default)]
struct CollectingSink {
    metrics: Mutex<Vec<String>>,
}

#[async_trait]
impl Sink for CollectingSink {
    async fn send_batch(&self, batch: &[DataPoint]) -> anyhow::Result<()> {
        let mut metrics = self.metrics.lock().unwrap();
        metrics.extend(batch.iter().map(|dp| dp.metric.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drains_everything_to_sink() {
    let cancel = CancellationToken::new();
    let (rx, handle) = dispatch::run(
        vec![gauge_collector("alpha", Duration::from_secs(1))],
        test_context(true),
        cancel.clone(),
        64,
    );

    let sink = Arc::new(CollectingSink::default());
    let s = sink.clone();
    let drain = tokio::spawn(async move {
        sink::drain(
            rx,
            s.as_ref(),
            DrainOptions {
                batch_size: 10,
                flush_interval: Duration::from_secs(1),
            },
        )
        .await
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    cancel.cancel();
    handle.join().await;
    let stats = drain.await.unwrap();

    let metrics = sink.metrics.lock().unwrap();
    assert_eq!(stats.points as usize, metrics.len());
    assert_eq!(metrics.iter().filter(|m| *m == "alpha.value").count(), 3);
    assert_eq!(metrics.iter().filter(|m| *m == ERROR_METRIC).count(), 3);
}
