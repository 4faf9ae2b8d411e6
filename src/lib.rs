pub mod builtin;
pub mod clock;
pub mod collector;
pub mod config;
pub mod context;
pub mod counters;
pub mod datapoint;
pub mod dispatch;
pub mod error;
#[cfg(feature = "listener")]
pub mod listener;
pub mod metadata;
pub mod registry;
pub mod sink;
pub mod tag_override;
pub mod tags;
pub mod util;

pub use collector::{
    Collected, Collector, CollectorSpec, ContinuousContext, ContinuousSpec, Emitter, IntervalSpec,
    PoolTask, StreamSpec,
};
pub use context::TelemetryContext;
pub use datapoint::{DataPoint, MetricMeta, MultiDataPoint, RateType, Value};
pub use registry::Registry;
pub use tags::TagSet;
