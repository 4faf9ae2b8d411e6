//! Starts the selected collectors against one shared output channel
//!
//! ```text
//!  collector-1 ─┐
//!  collector-2 ─┼──▶ mpsc (bounded) ──▶ caller (sink drain)
//!  collector-N ─┘
//! ```
//!
//! Init hooks run sequentially, in order, before any collector is spawned.
//! Every collector then runs in its own task until the shared cancellation
//! token fires or the receiving side is dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::Collector;
use crate::context::TelemetryContext;
use crate::datapoint::DataPoint;

/// Join handles of the spawned collectors
#[derive(Debug)]
pub struct DispatchHandle {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl DispatchHandle {
    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every collector task to finish.
    pub async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!("{name}: collector task failed: {e}");
            }
        }
        debug!("all collectors stopped");
    }
}

/// Initializes and spawns `collectors`, returning the receiving end of their
/// shared output channel.
pub fn run(
    collectors: Vec<Collector>,
    ctx: Arc<TelemetryContext>,
    cancel: CancellationToken,
    capacity: usize,
) -> (mpsc::Receiver<DataPoint>, DispatchHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let enabled: Vec<Collector> = collectors
        .into_iter()
        .filter(|c| {
            let enabled = c.init();
            if !enabled {
                info!("{}: disabled, not scheduling", c.name());
            }
            enabled
        })
        .collect();

    let handles = enabled
        .into_iter()
        .map(|c| {
            let name = c.name().to_string();
            debug!("{name}: starting {} collector", c.kind());
            let handle = tokio::spawn(c.run(tx.clone(), cancel.clone(), ctx.clone()));
            (name, handle)
        })
        .collect();

    (rx, DispatchHandle { handles })
}
