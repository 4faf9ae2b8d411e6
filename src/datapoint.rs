//! The unit of telemetry handed from collectors to the sink

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tags::TagSet;

/// Numeric sample value
///
/// Integers stay integral on the wire; booleans are coerced to `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i64)
    }
}

/// One `(metric, timestamp, value, tags)` sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,

    /// Unix seconds
    pub timestamp: i64,

    pub value: Value,

    #[serde(default)]
    pub tags: TagSet,
}

/// Ordered batch of points produced by one collection round
pub type MultiDataPoint = Vec<DataPoint>;

/// How a metric's values relate over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    #[default]
    Unknown,
    Gauge,
    Counter,
    Rate,
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateType::Unknown => "unknown",
            RateType::Gauge => "gauge",
            RateType::Counter => "counter",
            RateType::Rate => "rate",
        };
        f.write_str(s)
    }
}

/// Static descriptor shared by every emission of one metric
///
/// Leaf collectors build these once and pass them to
/// [`TelemetryContext::add_meta`](crate::context::TelemetryContext::add_meta)
/// instead of repeating rate, unit and description at every call site.
#[derive(Debug, Clone, Default)]
pub struct MetricMeta {
    pub metric: String,
    pub tags: TagSet,
    pub rate: RateType,
    pub unit: &'static str,
    pub desc: String,
}

impl MetricMeta {
    pub fn new(metric: impl Into<String>, rate: RateType, unit: &'static str) -> Self {
        Self {
            metric: metric.into(),
            rate,
            unit,
            ..Default::default()
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_coercion() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert_eq!(Value::from(false), Value::Int(0));
    }

    #[test]
    fn test_large_unsigned_falls_back_to_float() {
        assert_eq!(Value::from(42u64), Value::Int(42));
        assert!(matches!(Value::from(u64::MAX), Value::Float(_)));
    }

    #[test]
    fn test_datapoint_json_shape() {
        let dp = DataPoint {
            metric: "os.cpu".to_string(),
            timestamp: 1_700_000_000,
            value: Value::Int(3),
            tags: TagSet::from([("host", "a")]),
        };

        let json = serde_json::to_value(&dp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "metric": "os.cpu",
                "timestamp": 1_700_000_000,
                "value": 3,
                "tags": {"host": "a"}
            })
        );

        let back: DataPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, dp);
    }

    #[test]
    fn test_float_value_parses_as_float() {
        let dp: DataPoint = serde_json::from_str(
            r#"{"metric":"m","timestamp":1,"value":0.5,"tags":{"host":"h"}}"#,
        )
        .unwrap();
        assert_eq!(dp.value, Value::Float(0.5));
    }
}
