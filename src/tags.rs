//! Tag sets and the naming rules points must satisfy before they leave the agent
//!
//! A [`TagSet`] is an owned string-to-string mapping. Copying and merging never
//! touch the source set; every operation that combines sets returns a fresh one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TagError;

/// Tag dimensions of a single data point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Independent copy of this set.
    pub fn copy(&self) -> TagSet {
        self.clone()
    }

    /// Returns `self` overlaid with `overlay`. Keys present in both take the
    /// overlay's value.
    pub fn merge(&self, overlay: &TagSet) -> TagSet {
        let mut merged = self.clone();
        for (k, v) in &overlay.0 {
            merged.0.insert(k.clone(), v.clone());
        }
        merged
    }

    /// In-place form of [`TagSet::merge`].
    pub fn extend_from(&mut self, overlay: &TagSet) {
        for (k, v) in &overlay.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Stable `k=v,k=v` rendering, used as a map key for metadata.
    pub fn tag_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.tag_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for TagSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Pluggable naming check applied to every point before it is accepted
pub trait TagValidator: Send + Sync {
    fn validate_metric(&self, metric: &str) -> Result<(), TagError>;

    fn validate_tags(&self, tags: &TagSet) -> Result<(), TagError>;
}

/// OpenTSDB naming rules: letters, digits and `-_./`
#[derive(Debug, Clone, Copy, Default)]
pub struct TsdbValidator;

pub fn is_valid_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

pub fn is_valid_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_valid_char)
}

impl TagValidator for TsdbValidator {
    fn validate_metric(&self, metric: &str) -> Result<(), TagError> {
        if metric.is_empty() {
            return Err(TagError::EmptyMetric);
        }
        if !is_valid_name(metric) {
            return Err(TagError::InvalidMetric(metric.to_string()));
        }
        Ok(())
    }

    fn validate_tags(&self, tags: &TagSet) -> Result<(), TagError> {
        for (key, value) in tags.iter() {
            if key.is_empty() {
                return Err(TagError::EmptyKey);
            }
            if !is_valid_name(key) {
                return Err(TagError::InvalidKey(key.to_string()));
            }
            if value.is_empty() {
                return Err(TagError::EmptyValue(key.to_string()));
            }
            if !is_valid_name(value) {
                return Err(TagError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Strips every character the sink would reject.
pub fn clean(s: &str) -> String {
    s.chars().filter(|c| is_valid_char(*c)).collect()
}

/// Replaces every character the sink would reject with `replacement`.
pub fn replace_invalid(s: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_valid_char(c) {
            out.push(c);
        } else {
            out.push_str(replacement);
        }
    }
    out
}
