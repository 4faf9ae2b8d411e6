//! Error types for point construction and collector lifecycle

use std::fmt;

/// Errors raised while validating a metric name or tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// Metric name is empty
    EmptyMetric,

    /// Metric name contains a character the sink does not accept
    InvalidMetric(String),

    /// Tag key is empty
    EmptyKey,

    /// Tag value is empty
    EmptyValue(String),

    /// Tag key contains a character the sink does not accept
    InvalidKey(String),

    /// Tag value contains a character the sink does not accept
    InvalidValue { key: String, value: String },
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagError::EmptyMetric => write!(f, "empty metric name"),
            TagError::InvalidMetric(name) => write!(f, "invalid metric name: {name:?}"),
            TagError::EmptyKey => write!(f, "empty tag key"),
            TagError::EmptyValue(key) => write!(f, "empty value for tag {key:?}"),
            TagError::InvalidKey(key) => write!(f, "invalid tag key: {key:?}"),
            TagError::InvalidValue { key, value } => {
                write!(f, "invalid value {value:?} for tag {key:?}")
            }
        }
    }
}

impl std::error::Error for TagError {}

/// Errors raised while configuring or launching collectors
#[derive(Debug)]
pub enum CollectorError {
    /// A tag override pattern failed to compile
    InvalidPattern { pattern: String, source: regex::Error },

    /// A collector with the same name is already registered
    DuplicateName(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorError::InvalidPattern { pattern, source } => {
                write!(f, "invalid tag override pattern {pattern:?}: {source}")
            }
            CollectorError::DuplicateName(name) => {
                write!(f, "collector {name:?} is already registered")
            }
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectorError::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}
