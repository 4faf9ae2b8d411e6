//! Collectors and their three execution models
//!
//! A [`Collector`] pairs a name with a [`CollectorSpec`], one variant per
//! execution model. Each variant carries only what its model needs:
//!
//! - [`IntervalSpec`]: one collection call per fixed tick
//! - [`ContinuousSpec`]: a long-running function with its own internal loop
//! - [`StreamSpec`]: batches pushed in through a channel
//!
//! All three write to the same shared output channel through an [`Emitter`]
//! and observe the same process-wide cancellation token.

pub mod continuous;
pub mod emitter;
pub mod interval;
pub mod stats;
pub mod stream;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::TelemetryContext;
use crate::datapoint::DataPoint;
use crate::error::CollectorError;
use crate::tag_override::TagOverride;
use crate::tags::TagSet;

pub use continuous::{ContinuousContext, ContinuousSpec, PoolTask};
pub use emitter::{Emitter, OutputClosed};
pub use interval::{Collected, IntervalSpec};
pub use stats::{CollectorStats, StatsSender};
pub use stream::StreamSpec;

pub type InitFn = Arc<dyn Fn() + Send + Sync>;
pub type EnableFn = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub enum CollectorSpec {
    Interval(IntervalSpec),
    Continuous(ContinuousSpec),
    Stream(StreamSpec),
}

impl CollectorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorSpec::Interval(_) => "interval",
            CollectorSpec::Continuous(_) => "continuous",
            CollectorSpec::Stream(_) => "stream",
        }
    }
}

#[derive(Clone)]
pub struct Collector {
    name: String,
    spec: CollectorSpec,
    tag_override: TagOverride,
}

impl Collector {
    pub fn new(name: impl Into<String>, spec: CollectorSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            tag_override: TagOverride::new(),
        }
    }

    pub fn interval(name: impl Into<String>, spec: IntervalSpec) -> Self {
        Self::new(name, CollectorSpec::Interval(spec))
    }

    pub fn continuous(name: impl Into<String>, spec: ContinuousSpec) -> Self {
        Self::new(name, CollectorSpec::Continuous(spec))
    }

    pub fn stream(name: impl Into<String>, spec: StreamSpec) -> Self {
        Self::new(name, CollectorSpec::Stream(spec))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.spec.kind()
    }

    pub fn spec(&self) -> &CollectorSpec {
        &self.spec
    }

    pub fn tag_override(&self) -> &TagOverride {
        &self.tag_override
    }

    pub fn add_tag_overrides<'a>(
        &mut self,
        matched: impl IntoIterator<Item = (&'a String, &'a String)>,
        tags: &TagSet,
    ) -> Result<(), CollectorError> {
        self.tag_override.add(matched, tags)
    }

    /// One-time setup. Runs the init hook, then the enable predicate; returns
    /// whether the collector should be scheduled.
    pub fn init(&self) -> bool {
        let (init, enable) = match &self.spec {
            CollectorSpec::Interval(s) => (s.init.as_ref(), s.enable.as_ref()),
            CollectorSpec::Continuous(s) => (s.init.as_ref(), s.enable.as_ref()),
            CollectorSpec::Stream(s) => (s.init.as_ref(), None),
        };
        if let Some(init) = init {
            init();
        }
        let enabled = enable.is_none_or(|enable| enable());
        debug!("{}: init done (enabled: {enabled})", self.name);
        enabled
    }

    /// Runs until `cancel` fires or the output channel closes.
    pub async fn run(
        self,
        out: mpsc::Sender<DataPoint>,
        cancel: CancellationToken,
        ctx: Arc<TelemetryContext>,
    ) {
        let emitter = Emitter::with_override(out, &self.tag_override);
        match self.spec {
            CollectorSpec::Interval(spec) => {
                interval::run(self.name, spec, emitter, cancel, ctx).await
            }
            CollectorSpec::Continuous(spec) => {
                continuous::run(self.name, spec, emitter, cancel, ctx).await
            }
            CollectorSpec::Stream(spec) => stream::run(self.name, spec, emitter, cancel, ctx).await,
        }
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}
