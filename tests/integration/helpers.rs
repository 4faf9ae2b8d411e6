//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use scollector::{
    Collected, Collector, DataPoint, IntervalSpec, RateType, TagSet, TelemetryContext,
    clock::ManualClock, metadata::unit,
};
use tokio::sync::mpsc;

pub const TEST_START: i64 = 1_700_000_000;

pub fn test_context(self_monitoring: bool) -> Arc<TelemetryContext> {
    Arc::new(
        TelemetryContext::builder("agent01")
            .default_tags(TagSet::from([("dc", "test")]))
            .clock(Arc::new(ManualClock::new(TEST_START)))
            .default_interval(Duration::from_secs(15))
            .self_monitoring(self_monitoring)
            .build(),
    )
}

/// Interval collector emitting one `<name>.value` gauge per tick
pub fn gauge_collector(name: &'static str, every: Duration) -> Collector {
    Collector::interval(
        name,
        IntervalSpec::new(move |ctx: Arc<TelemetryContext>| async move {
            let mut md = vec![];
            ctx.add(
                &mut md,
                &format!("{name}.value"),
                1,
                None,
                RateType::Gauge,
                unit::NONE,
                "",
            );
            Collected::ok(md)
        })
        .with_interval(every),
    )
}

pub fn drain_now(rx: &mut mpsc::Receiver<DataPoint>) -> Vec<DataPoint> {
    let mut out = vec![];
    while let Ok(dp) = rx.try_recv() {
        out.push(dp);
    }
    out
}

pub fn point(metric: &str, value: i64) -> DataPoint {
    DataPoint {
        metric: metric.to_string(),
        timestamp: TEST_START,
        value: value.into(),
        tags: TagSet::from([("host", "agent01")]),
    }
}
