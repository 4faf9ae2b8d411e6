//! Process-scoped telemetry state and the point construction primitives
//!
//! A [`TelemetryContext`] is built once at startup and shared by reference with
//! every collector. It owns everything `add`/`add_ts` need: the hostname,
//! the default tag layer, the timestamp source, the naming validator and the
//! metadata and counter side channels.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::counters::Counters;
use crate::datapoint::{DataPoint, MetricMeta, MultiDataPoint, RateType, Value};
use crate::metadata::MetadataRegistry;
use crate::tags::{TagSet, TagValidator, TsdbValidator};

/// Default collection interval when neither the collector nor the config sets one
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Counter bumped whenever a point fails validation
pub const DROPPED_POINTS: &str = "collector.dropped_points";

pub struct TelemetryContext {
    hostname: String,
    default_tags: TagSet,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn TagValidator>,
    metadata: MetadataRegistry,
    counters: Counters,
    default_interval: Duration,
    self_monitoring: bool,
}

impl TelemetryContext {
    pub fn builder(hostname: impl Into<String>) -> TelemetryContextBuilder {
        TelemetryContextBuilder {
            hostname: hostname.into(),
            default_tags: TagSet::new(),
            clock: None,
            validator: None,
            default_interval: DEFAULT_INTERVAL,
            self_monitoring: true,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn default_tags(&self) -> &TagSet {
        &self.default_tags
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn validator(&self) -> Arc<dyn TagValidator> {
        Arc::clone(&self.validator)
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    pub fn self_monitoring(&self) -> bool {
        self.self_monitoring
    }

    pub fn os(&self) -> &'static str {
        std::env::consts::OS
    }

    /// Bumps a process-wide self-monitoring counter.
    pub fn inc_scollector(&self, key: &str, amount: i64) {
        self.counters.inc(key, amount);
    }

    /// Tags carried by the framework's own `scollector.collector.*` points
    pub fn self_tags(&self, collector: &str) -> TagSet {
        TagSet::from([("collector", collector), ("os", self.os())])
    }

    /// Appends a point stamped with the cached current time.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        md: &mut MultiDataPoint,
        metric: &str,
        value: impl Into<Value>,
        tags: Option<&TagSet>,
        rate: RateType,
        unit: &str,
        desc: &str,
    ) {
        self.add_ts(md, metric, self.now(), value, tags, rate, unit, desc);
    }

    /// Appends a point with an explicit timestamp.
    ///
    /// The caller's tags are never modified. A missing `host` tag is filled in
    /// with the context hostname; `host` set to `""` removes it. Default tags
    /// form the base layer under the call's tags. Points that fail validation
    /// or carry a NaN or infinite value are logged and dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ts(
        &self,
        md: &mut MultiDataPoint,
        metric: &str,
        timestamp: i64,
        value: impl Into<Value>,
        tags: Option<&TagSet>,
        rate: RateType,
        unit: &str,
        desc: &str,
    ) {
        let mut own = tags.map(TagSet::copy).unwrap_or_default();
        match own.get("host") {
            None => {
                own.insert("host", self.hostname.as_str());
            }
            Some("") => {
                own.remove("host");
            }
            Some(_) => {}
        }
        let tags = self.default_tags.merge(&own);

        if let Err(e) = self.validator.validate_metric(metric) {
            warn!("dropping point {metric}{tags}: {e}");
            self.counters.inc(DROPPED_POINTS, 1);
            return;
        }
        if let Err(e) = self.validator.validate_tags(&tags) {
            warn!("dropping point {metric}{tags}: {e}");
            self.counters.inc(DROPPED_POINTS, 1);
            return;
        }
        let value = value.into();
        if let Value::Float(f) = value
            && !f.is_finite()
        {
            warn!("dropping point {metric}{tags}: non-finite value {f}");
            self.counters.inc(DROPPED_POINTS, 1);
            return;
        }

        if rate != RateType::Unknown {
            self.metadata.put(metric, None, "rate", &rate.to_string());
        }
        if !unit.is_empty() {
            self.metadata.put(metric, None, "unit", unit);
        }
        if !desc.is_empty() {
            self.metadata.put(metric, Some(&tags), "desc", desc);
        }

        md.push(DataPoint {
            metric: metric.to_string(),
            timestamp,
            value,
            tags,
        });
    }

    /// Appends a point described by `meta`; `tags` overlay the meta's own tags.
    pub fn add_meta(
        &self,
        md: &mut MultiDataPoint,
        meta: &MetricMeta,
        value: impl Into<Value>,
        tags: Option<&TagSet>,
    ) {
        let tags = match tags {
            Some(t) => meta.tags.merge(t),
            None => meta.tags.copy(),
        };
        self.add(
            md,
            &meta.metric,
            value,
            Some(&tags),
            meta.rate,
            meta.unit,
            &meta.desc,
        );
    }
}

pub struct TelemetryContextBuilder {
    hostname: String,
    default_tags: TagSet,
    clock: Option<Arc<dyn Clock>>,
    validator: Option<Arc<dyn TagValidator>>,
    default_interval: Duration,
    self_monitoring: bool,
}

impl TelemetryContextBuilder {
    pub fn default_tags(mut self, tags: TagSet) -> Self {
        self.default_tags = tags;
        self
    }

    /// Defaults to reading the wall clock on every call.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn TagValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn self_monitoring(mut self, enabled: bool) -> Self {
        self.self_monitoring = enabled;
        self
    }

    pub fn build(self) -> TelemetryContext {
        TelemetryContext {
            hostname: self.hostname,
            default_tags: self.default_tags,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            validator: self.validator.unwrap_or_else(|| Arc::new(TsdbValidator)),
            metadata: MetadataRegistry::new(),
            counters: Counters::new(),
            default_interval: self.default_interval,
            self_monitoring: self.self_monitoring,
        }
    }
}
