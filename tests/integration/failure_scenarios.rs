//! Failure tests for collectors and dispatch
//!
//! These tests verify that one misbehaving collector never takes down the
//! rest of the agent:
//! - Failing and panicking collection rounds
//! - Points with invalid names
//! - Streams that never open
//! - A consumer that goes away

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use scollector::{
    Collected, Collector, IntervalSpec, RateType, StreamSpec, TelemetryContext, builtin,
    collector::stats::ERROR_METRIC,
    context::DROPPED_POINTS,
    datapoint::Value,
    dispatch,
    metadata::unit,
};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_failing_collector_does_not_affect_others() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let failing = Collector::interval(
        "failing",
        IntervalSpec::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Collected::failed(anyhow!("backend unreachable")) }
        })
        .with_interval(Duration::from_secs(1)),
    );

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(
        vec![failing, gauge_collector("healthy", Duration::from_secs(1))],
        test_context(true),
        cancel.clone(),
        256,
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let points = drain_now(&mut rx);

    // keeps ticking after errors
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(points.iter().filter(|p| p.metric == "healthy.value").count(), 3);

    let errors: Vec<_> = points
        .iter()
        .filter(|p| p.metric == ERROR_METRIC)
        .map(|p| (p.tags.get("collector").unwrap().to_string(), p.value))
        .collect();
    assert!(errors.contains(&("failing".to_string(), Value::Int(1))));
    assert!(errors.contains(&("healthy".to_string(), Value::Int(0))));
    assert!(!errors.contains(&("healthy".to_string(), Value::Int(1))));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_round_is_contained() {
    let panicking = Collector::interval(
        "panicking",
        IntervalSpec::new(|_| async {
            if true {
                panic!("collector bug");
            }
            Collected::default()
        })
        .with_interval(Duration::from_secs(1)),
    );

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(vec![panicking], test_context(true), cancel.clone(), 64);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let failures = drain_now(&mut rx)
        .into_iter()
        .filter(|p| p.metric == ERROR_METRIC && p.value == Value::Int(1))
        .count();
    assert_eq!(failures, 2);

    cancel.cancel();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_points_dropped_and_counted() {
    let ctx = test_context(false);
    let bad = Collector::interval(
        "bad_names",
        IntervalSpec::new(|ctx: Arc<TelemetryContext>| async move {
            let mut md = vec![];
            ctx.add(&mut md, "has space", 1, None, RateType::Gauge, unit::NONE, "");
            ctx.add(&mut md, "fine.metric", 1, None, RateType::Gauge, unit::NONE, "");
            Collected::ok(md)
        })
        .with_interval(Duration::from_secs(60)),
    );

    let cancel = CancellationToken::new();
    let (mut rx, handle) = dispatch::run(
        vec![bad, builtin::scollector_counters()],
        ctx.clone(),
        cancel.clone(),
        64,
    );

    while rx.recv().await.unwrap().metric != "fine.metric" {}
    assert_eq!(ctx.counters().get(DROPPED_POINTS), 1);

    // the counter collector picks it up on its next tick
    tokio::time::sleep(Duration::from_secs(16)).await;
    let counters: Vec<_> = drain_now(&mut rx)
        .into_iter()
        .filter(|p| p.metric == format!("scollector.{DROPPED_POINTS}"))
        .collect();
    assert_eq!(counters.last().unwrap().value, Value::Int(1));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_stream_that_fails_to_open_exits() {
    let broken = Collector::stream(
        "broken",
        StreamSpec::new(|_| async { Err(anyhow!("address in use")) }),
    );

    let (mut rx, handle) = dispatch::run(
        vec![broken],
        test_context(true),
        CancellationToken::new(),
        8,
    );

    handle.join().await;
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_collector_never_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let disabled = Collector::interval(
        "disabled",
        IntervalSpec::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Collected::default() }
        })
        .with_enable(|| false),
    );

    let cancel = CancellationToken::new();
    let (_rx, handle) = dispatch::run(vec![disabled], test_context(false), cancel.clone(), 8);
    assert!(handle.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_consumer_stops_all_collectors() {
    let (rx, handle) = dispatch::run(
        vec![
            gauge_collector("alpha", Duration::from_secs(1)),
            gauge_collector("beta", Duration::from_secs(1)),
        ],
        test_context(true),
        CancellationToken::new(),
        1,
    );
    drop(rx);

    tokio::time::timeout(Duration::from_secs(30), handle.join())
        .await
        .expect("collectors should stop once the output is gone");
}
