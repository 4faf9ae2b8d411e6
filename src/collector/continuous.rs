//! Continuous collectors: a long-running function owning its own loop
//!
//! The framework hands the function a [`ContinuousContext`] and awaits it; the
//! function is expected to run until `cancel` fires, reporting a
//! [`CollectorStats`] after every unit of work. Stats are folded into at most
//! one duration/error pair per [`STATS_FLUSH_INTERVAL`].
//!
//! [`ContinuousSpec::pool`] covers the common case of several sub-queries on
//! independent schedules sharing a bounded set of workers:
//!
//! ```text
//! schedule(task A, 5s) ─┐
//! schedule(task B, 60s) ┼──▶ queue ──▶ worker 1..N ──▶ emitter
//! schedule(task C, 10s) ┘                 │
//!                                         └──▶ stats
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::context::TelemetryContext;

use super::emitter::Emitter;
use super::interval::{CollectFn, Collected, collect_fn, collect_once};
use super::stats::{self, CollectorStats, STATS_FLUSH_INTERVAL, StatsSender};
use super::{EnableFn, InitFn};

/// Everything a continuous function needs to run
#[derive(Clone)]
pub struct ContinuousContext {
    pub name: String,
    pub telemetry: Arc<TelemetryContext>,
    pub emitter: Emitter,
    pub stats: StatsSender,
    pub cancel: CancellationToken,
}

pub type ContinuousFn = Arc<dyn Fn(ContinuousContext) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub struct ContinuousSpec {
    pub(crate) run: ContinuousFn,
    pub(crate) enable: Option<EnableFn>,
    pub(crate) init: Option<InitFn>,
}

impl ContinuousSpec {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ContinuousContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            run: Arc::new(
                move |cx: ContinuousContext| -> BoxFuture<'static, ()> { f(cx).boxed() },
            ),
            enable: None,
            init: None,
        }
    }

    /// Runs `tasks` on their own schedules across `workers` shared workers.
    pub fn pool(workers: usize, tasks: Vec<PoolTask>) -> Self {
        let tasks = Arc::new(tasks);
        Self::new(move |cx| run_pool(workers, tasks.as_ref().clone(), cx))
    }

    pub fn with_enable(mut self, enable: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.enable = Some(Arc::new(enable));
        self
    }

    pub fn with_init(mut self, init: impl Fn() + Send + Sync + 'static) -> Self {
        self.init = Some(Arc::new(init));
        self
    }
}

/// One sub-query of a pooled continuous collector
#[derive(Clone)]
pub struct PoolTask {
    pub name: String,
    pub interval: Duration,
    pub collect: CollectFn,
}

impl PoolTask {
    pub fn new<F, Fut, R>(name: impl Into<String>, interval: Duration, f: F) -> Self
    where
        F: Fn(Arc<TelemetryContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Collected> + 'static,
    {
        Self {
            name: name.into(),
            interval,
            collect: collect_fn(f),
        }
    }
}

#[instrument(skip_all, fields(collector = %name))]
pub(crate) async fn run(
    name: String,
    spec: ContinuousSpec,
    emitter: Emitter,
    cancel: CancellationToken,
    ctx: Arc<TelemetryContext>,
) {
    debug!("starting continuous collector");

    let (stats, aggregator) = stats::start(&name, &ctx, emitter.raw(), Some(STATS_FLUSH_INTERVAL));

    let cx = ContinuousContext {
        name: name.clone(),
        telemetry: ctx,
        emitter,
        stats,
        cancel,
    };
    (spec.run)(cx).await;

    // stats clones may outlive the function in detached tasks
    if let Some(aggregator) = aggregator {
        aggregator.close().await;
    }
    debug!("continuous collector stopped");
}

struct Scheduled {
    task: PoolTask,
    in_flight: AtomicBool,
}

async fn run_pool(workers: usize, tasks: Vec<PoolTask>, cx: ContinuousContext) {
    let workers = workers.max(1);
    let (queue_tx, queue_rx) = mpsc::channel::<Arc<Scheduled>>(workers * 2);
    let queue_rx = Arc::new(Mutex::new(queue_rx));

    let mut set = JoinSet::new();

    for mut task in tasks {
        if task.interval.is_zero() {
            task.interval = cx.telemetry.default_interval();
        }
        let scheduled = Arc::new(Scheduled {
            task,
            in_flight: AtomicBool::new(false),
        });
        set.spawn(schedule(scheduled, queue_tx.clone(), cx.cancel.clone()));
    }
    drop(queue_tx);

    for id in 0..workers {
        set.spawn(work(id, Arc::clone(&queue_rx), cx.clone()));
    }

    while let Some(result) = set.join_next().await {
        if let Err(e) = result {
            error!("{}: pool task failed: {e}", cx.name);
        }
    }
}

/// Feeds one task into the queue on its own interval. A tick is skipped while
/// the previous run of the same task is still queued or running.
async fn schedule(
    scheduled: Arc<Scheduled>,
    queue: mpsc::Sender<Arc<Scheduled>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(scheduled.task.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if scheduled.in_flight.swap(true, Ordering::AcqRel) {
            trace!("{}: previous run still in flight, skipping", scheduled.task.name);
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(Arc::clone(&scheduled)) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn work(id: usize, queue: Arc<Mutex<mpsc::Receiver<Arc<Scheduled>>>>, cx: ContinuousContext) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cx.cancel.cancelled() => None,
                next = rx.recv() => next,
            }
        };
        let Some(scheduled) = next else {
            break;
        };

        let task = &scheduled.task;
        let start = Instant::now();
        let Collected { points, error } = collect_once(&task.collect, &cx.telemetry).await;
        let elapsed = start.elapsed();
        scheduled.in_flight.store(false, Ordering::Release);

        let failed = error.is_some();
        if let Some(e) = error {
            error!("{}/{}: {e:#}", cx.name, task.name);
        }
        cx.stats.report(CollectorStats::new(elapsed, failed));

        if cx.emitter.emit_all(points).await.is_err() {
            warn!("worker {id}: output channel closed");
            break;
        }
    }
    trace!("worker {id} stopped");
}
