//! Interval collectors: one collection call per tick
//!
//! ```text
//! idle ──tick──▶ running ──points/error──▶ idle ──cancel──▶ stopped
//! ```
//!
//! Ticks never overlap. A tick that overruns its interval delays the next one;
//! missed ticks are skipped rather than queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::context::TelemetryContext;
use crate::datapoint::MultiDataPoint;

use super::emitter::Emitter;
use super::stats::{self, CollectorStats};
use super::{EnableFn, InitFn};

/// Result of one collection round
///
/// `points` are emitted even when `error` is set; a set error always marks the
/// round as failed for self-monitoring.
#[derive(Debug, Default)]
pub struct Collected {
    pub points: MultiDataPoint,
    pub error: Option<anyhow::Error>,
}

impl Collected {
    pub fn ok(points: MultiDataPoint) -> Self {
        Self {
            points,
            error: None,
        }
    }

    pub fn failed(error: anyhow::Error) -> Self {
        Self {
            points: MultiDataPoint::new(),
            error: Some(error),
        }
    }

    pub fn partial(points: MultiDataPoint, error: anyhow::Error) -> Self {
        Self {
            points,
            error: Some(error),
        }
    }
}

impl From<anyhow::Result<MultiDataPoint>> for Collected {
    fn from(result: anyhow::Result<MultiDataPoint>) -> Self {
        match result {
            Ok(points) => Collected::ok(points),
            Err(e) => Collected::failed(e),
        }
    }
}

impl From<MultiDataPoint> for Collected {
    fn from(points: MultiDataPoint) -> Self {
        Collected::ok(points)
    }
}

pub type CollectFn = Arc<dyn Fn(Arc<TelemetryContext>) -> BoxFuture<'static, Collected> + Send + Sync>;

/// Wraps an async collection function into a [`CollectFn`].
pub fn collect_fn<F, Fut, R>(f: F) -> CollectFn
where
    F: Fn(Arc<TelemetryContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Collected> + 'static,
{
    Arc::new(
        move |ctx: Arc<TelemetryContext>| -> BoxFuture<'static, Collected> {
            f(ctx).map(Into::into).boxed()
        },
    )
}

#[derive(Clone)]
pub struct IntervalSpec {
    pub(crate) collect: CollectFn,
    pub(crate) interval: Option<Duration>,
    pub(crate) enable: Option<EnableFn>,
    pub(crate) init: Option<InitFn>,
}

impl IntervalSpec {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Arc<TelemetryContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Collected> + 'static,
    {
        Self {
            collect: collect_fn(f),
            interval: None,
            enable: None,
            init: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Predicate checked once at init; `false` keeps the collector unscheduled.
    pub fn with_enable(mut self, enable: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.enable = Some(Arc::new(enable));
        self
    }

    /// One-time setup run at init, before the enable predicate.
    pub fn with_init(mut self, init: impl Fn() + Send + Sync + 'static) -> Self {
        self.init = Some(Arc::new(init));
        self
    }

    /// Configured interval, or the context default when unset.
    pub fn interval(&self, ctx: &TelemetryContext) -> Duration {
        self.interval
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| ctx.default_interval())
    }
}

/// Runs `collect` once in its own task so a panic fails only this round.
pub(crate) async fn collect_once(collect: &CollectFn, ctx: &Arc<TelemetryContext>) -> Collected {
    match tokio::spawn(collect(Arc::clone(ctx))).await {
        Ok(collected) => collected,
        Err(e) => Collected::failed(anyhow!("collection task failed: {e}")),
    }
}

#[instrument(skip_all, fields(collector = %name))]
pub(crate) async fn run(
    name: String,
    spec: IntervalSpec,
    emitter: Emitter,
    cancel: CancellationToken,
    ctx: Arc<TelemetryContext>,
) {
    let period = spec.interval(&ctx);
    debug!("starting interval collector every {period:?}");

    let (stats, aggregator) = stats::start(&name, &ctx, emitter.raw(), None);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("cancelled");
                break;
            }

            _ = ticker.tick() => {}
        }

        let start = Instant::now();
        let Collected { points, error } = collect_once(&spec.collect, &ctx).await;
        let elapsed = start.elapsed();

        let failed = error.is_some();
        if let Some(e) = error {
            error!("{name}: {e:#}");
        }
        stats.report(CollectorStats::new(elapsed, failed));

        trace!("collected {} points in {elapsed:?}", points.len());
        if emitter.emit_all(points).await.is_err() {
            warn!("output channel closed, stopping");
            break;
        }
    }

    drop(stats);
    if let Some(aggregator) = aggregator {
        aggregator.close().await;
    }
    debug!("interval collector stopped");
}
