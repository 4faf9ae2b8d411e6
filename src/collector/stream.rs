//! Stream collectors: batches pushed in from an external source
//!
//! The open function runs once when the collector starts and returns the
//! inbound channel (this is where e.g. a listening socket is bound). There is
//! no timer; backpressure is whatever the inbound channel imposes.

use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::context::TelemetryContext;
use crate::datapoint::{MultiDataPoint, RateType};
use crate::metadata::unit;

use super::InitFn;
use super::emitter::Emitter;
use super::stats::COUNT_METRIC;

pub type OpenFn = Arc<
    dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<mpsc::Receiver<MultiDataPoint>>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct StreamSpec {
    pub(crate) open: OpenFn,
    pub(crate) init: Option<InitFn>,
}

impl StreamSpec {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<mpsc::Receiver<MultiDataPoint>>> + Send + 'static,
    {
        Self {
            open: Arc::new(
                move |cancel: CancellationToken| -> BoxFuture<
                    'static,
                    anyhow::Result<mpsc::Receiver<MultiDataPoint>>,
                > { f(cancel).boxed() },
            ),
            init: None,
        }
    }

    /// Wraps an existing receiver. It can be opened once.
    pub fn from_receiver(rx: mpsc::Receiver<MultiDataPoint>) -> Self {
        let slot = Arc::new(Mutex::new(Some(rx)));
        Self::new(move |_| {
            let rx = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            async move { rx.ok_or_else(|| anyhow!("stream receiver already taken")) }
        })
    }

    pub fn with_init(mut self, init: impl Fn() + Send + Sync + 'static) -> Self {
        self.init = Some(Arc::new(init));
        self
    }
}

#[instrument(skip_all, fields(collector = %name))]
pub(crate) async fn run(
    name: String,
    spec: StreamSpec,
    emitter: Emitter,
    cancel: CancellationToken,
    ctx: Arc<TelemetryContext>,
) {
    let mut inbound = match (spec.open)(cancel.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            error!("failed to open stream: {e:#}");
            return;
        }
    };
    debug!("stream opened");

    let self_tags = ctx.self_tags(&name);
    let mut count: i64 = 0;

    loop {
        let mut md = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("cancelled");
                break;
            }

            batch = inbound.recv() => match batch {
                Some(md) => md,
                None => {
                    warn!("inbound stream closed");
                    break;
                }
            },
        };

        trace!("received batch of {} points", md.len());

        if ctx.self_monitoring() {
            count += md.len() as i64;
            ctx.add(
                &mut md,
                COUNT_METRIC,
                count,
                Some(&self_tags),
                RateType::Counter,
                unit::COUNT,
                "Counter of metrics passed through.",
            );
        }

        for mut dp in md {
            dp.tags = ctx.default_tags().merge(&dp.tags);
            if !dp.tags.contains_key("host") {
                dp.tags.insert("host", ctx.hostname());
            }
            if emitter.emit(dp).await.is_err() {
                warn!("output channel closed, stopping");
                return;
            }
        }
    }

    debug!("stream collector stopped");
}
