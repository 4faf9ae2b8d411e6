//! Collector self-monitoring
//!
//! Every scheduled collector owns a bounded stats channel drained by exactly
//! one aggregator task. The collector only ever `try_send`s, so a slow
//! aggregator never delays collection.
//!
//! ```text
//! collector ──CollectorStats──▶ aggregator ──scollector.collector.{duration,error}──▶ output
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::context::TelemetryContext;
use crate::datapoint::{MultiDataPoint, RateType};
use crate::metadata::unit;

use super::emitter::Emitter;

/// Window over which continuous collectors' stats are folded
pub const STATS_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

const STATS_CHANNEL_CAPACITY: usize = 64;

pub const DURATION_METRIC: &str = "scollector.collector.duration";
pub const ERROR_METRIC: &str = "scollector.collector.error";
pub const COUNT_METRIC: &str = "scollector.collector.count";

/// Outcome of one unit of collection work
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectorStats {
    /// Seconds
    pub duration: f64,

    /// 0 = success, 1 = failure
    pub result: u8,
}

impl CollectorStats {
    pub fn new(elapsed: Duration, failed: bool) -> Self {
        Self {
            duration: elapsed.as_secs_f64(),
            result: failed as u8,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result != 0
    }
}

/// Collector-side handle to the stats channel
///
/// A disabled sender (self-monitoring off) silently discards reports.
#[derive(Debug, Clone)]
pub struct StatsSender {
    tx: Option<mpsc::Sender<CollectorStats>>,
}

impl StatsSender {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn report(&self, stats: CollectorStats) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(stats) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("stats channel full, dropping collector stats"),
            Err(TrySendError::Closed(_)) => trace!("stats aggregator gone"),
        }
    }
}

/// Accumulated stats since the last flush
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StatsWindow {
    total: f64,
    result: u8,
    count: usize,
}

impl StatsWindow {
    fn fold(&mut self, stats: CollectorStats) {
        self.total += stats.duration;
        self.result = self.result.max(stats.result);
        self.count += 1;
    }

    fn take(&mut self) -> Option<CollectorStats> {
        if self.count == 0 {
            return None;
        }
        let out = CollectorStats {
            duration: self.total,
            result: self.result,
        };
        *self = StatsWindow::default();
        Some(out)
    }
}

/// Running aggregator task
#[derive(Debug)]
pub struct Aggregator {
    handle: JoinHandle<()>,
    close: CancellationToken,
}

impl Aggregator {
    /// Stops the aggregator even while sender clones are still alive. Reports
    /// already queued are folded in before it exits.
    pub async fn close(self) {
        self.close.cancel();
        let _ = self.handle.await;
    }
}

/// Starts the aggregator for `name`.
///
/// With `window = None` every report is emitted as its own duration/error
/// pair. With `Some(period)` reports are folded (durations summed, any failure
/// marks the window failed) and flushed at most once per period.
///
/// Returns a disabled sender and no task when self-monitoring is off.
pub fn start(
    name: &str,
    ctx: &Arc<TelemetryContext>,
    emitter: Emitter,
    window: Option<Duration>,
) -> (StatsSender, Option<Aggregator>) {
    if !ctx.self_monitoring() {
        return (StatsSender::disabled(), None);
    }

    let (tx, rx) = mpsc::channel(STATS_CHANNEL_CAPACITY);
    let close = CancellationToken::new();
    let handle = tokio::spawn(aggregate(
        name.to_string(),
        Arc::clone(ctx),
        rx,
        emitter,
        window,
        close.clone(),
    ));

    (StatsSender { tx: Some(tx) }, Some(Aggregator { handle, close }))
}

async fn aggregate(
    name: String,
    ctx: Arc<TelemetryContext>,
    mut rx: mpsc::Receiver<CollectorStats>,
    emitter: Emitter,
    window: Option<Duration>,
    close: CancellationToken,
) {
    let Some(period) = window else {
        loop {
            let stats = tokio::select! {
                stats = rx.recv() => stats,
                _ = close.cancelled() => rx.try_recv().ok(),
            };
            let Some(stats) = stats else {
                break;
            };
            if emit(&name, &ctx, &emitter, stats).await.is_err() {
                break;
            }
        }
        trace!("{name}: stats aggregator stopped");
        return;
    };

    let mut acc = StatsWindow::default();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            stats = rx.recv() => match stats {
                Some(stats) => acc.fold(stats),
                None => break,
            },

            _ = close.cancelled() => {
                while let Ok(stats) = rx.try_recv() {
                    acc.fold(stats);
                }
                break;
            }

            _ = ticker.tick() => {
                if let Some(stats) = acc.take()
                    && emit(&name, &ctx, &emitter, stats).await.is_err()
                {
                    break;
                }
            }
        }
    }

    if acc.count > 0 {
        debug!("{name}: discarding {} unflushed stats", acc.count);
    }
    trace!("{name}: stats aggregator stopped");
}

async fn emit(
    name: &str,
    ctx: &TelemetryContext,
    emitter: &Emitter,
    stats: CollectorStats,
) -> Result<(), super::emitter::OutputClosed> {
    let tags = ctx.self_tags(name);
    let mut md = MultiDataPoint::with_capacity(2);
    ctx.add(
        &mut md,
        DURATION_METRIC,
        stats.duration,
        Some(&tags),
        RateType::Gauge,
        unit::SECOND,
        "Duration in seconds for each collector run.",
    );
    ctx.add(
        &mut md,
        ERROR_METRIC,
        stats.result,
        Some(&tags),
        RateType::Gauge,
        unit::OK,
        "Status of collector run. 1=Error, 0=Success.",
    );
    emitter.emit_all(md).await
}
