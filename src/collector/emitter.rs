//! Hand-off from a collector to the shared output channel

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::datapoint::{DataPoint, MultiDataPoint};
use crate::tag_override::TagOverride;

/// The output channel has no receiver left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputClosed;

impl fmt::Display for OutputClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output channel closed")
    }
}

impl std::error::Error for OutputClosed {}

/// Sender side of the shared point channel, bound to one collector
///
/// Applies the collector's tag override to every point before sending.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<DataPoint>,
    tag_override: Option<Arc<TagOverride>>,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<DataPoint>) -> Self {
        Self {
            tx,
            tag_override: None,
        }
    }

    pub fn with_override(tx: mpsc::Sender<DataPoint>, tag_override: &TagOverride) -> Self {
        let tag_override = if tag_override.is_empty() {
            None
        } else {
            Some(Arc::new(tag_override.clone()))
        };
        Self { tx, tag_override }
    }

    /// Same channel, no override. Used for the framework's own points.
    pub fn raw(&self) -> Emitter {
        Emitter::new(self.tx.clone())
    }

    pub async fn emit(&self, mut dp: DataPoint) -> Result<(), OutputClosed> {
        if let Some(o) = &self.tag_override {
            o.apply(&mut dp.tags);
        }
        self.tx.send(dp).await.map_err(|_| OutputClosed)
    }

    /// Sends every point in order.
    pub async fn emit_all(&self, md: MultiDataPoint) -> Result<(), OutputClosed> {
        for dp in md {
            self.emit(dp).await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
