//! Metric metadata side channel
//!
//! `add`/`add_ts` report rate type, unit and description here rather than
//! embedding them in points. Repeating identical metadata is a no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::trace;

use crate::tags::TagSet;

/// Common unit strings
pub mod unit {
    pub const NONE: &str = "";
    pub const BYTES: &str = "bytes";
    pub const COUNT: &str = "count";
    pub const LOAD: &str = "load";
    pub const OK: &str = "bool";
    pub const PCT: &str = "percent";
    pub const SECOND: &str = "seconds";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct MetaKey {
    metric: String,
    tags: String,
    name: String,
}

/// One metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metasend {
    pub metric: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tags: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: Mutex<HashMap<MetaKey, String>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name=value` for `metric` (optionally scoped to `tags`).
    /// Returns `true` when the stored value changed.
    pub fn put(&self, metric: &str, tags: Option<&TagSet>, name: &str, value: &str) -> bool {
        let key = MetaKey {
            metric: metric.to_string(),
            tags: tags.map(TagSet::tag_string).unwrap_or_default(),
            name: name.to_string(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(&key).is_some_and(|existing| existing == value) {
            return false;
        }
        trace!("metadata {}{{{}}} {} = {}", key.metric, key.tags, key.name, value);
        entries.insert(key, value.to_string());
        true
    }

    pub fn get(&self, metric: &str, tags: Option<&TagSet>, name: &str) -> Option<String> {
        let key = MetaKey {
            metric: metric.to_string(),
            tags: tags.map(TagSet::tag_string).unwrap_or_default(),
            name: name.to_string(),
        };
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by metric, tags and name.
    pub fn snapshot(&self) -> Vec<Metasend> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = entries.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        keys.into_iter()
            .map(|(k, v)| Metasend {
                metric: k.metric.clone(),
                tags: k.tags.clone(),
                name: k.name.clone(),
                value: v.clone(),
            })
            .collect()
    }
}
