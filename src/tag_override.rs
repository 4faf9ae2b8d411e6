//! Deployment-time tag rewriting for a collector's points
//!
//! Two passes, applied in order to every point just before hand-off:
//!
//! 1. **Extraction**: for each configured tag key, match the tag's current
//!    value against a regex and copy every non-empty named capture group into
//!    the set as a new tag.
//! 2. **Overlay**: set each configured tag to a fixed value, or delete it when
//!    the configured value is empty.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::CollectorError;
use crate::tags::TagSet;

#[derive(Debug, Clone, Default)]
pub struct TagOverride {
    matched: BTreeMap<String, Regex>,
    tags: TagSet,
}

impl TagOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds extraction patterns (tag key -> regex) and static tags. Later calls
    /// replace patterns and tags with the same key.
    pub fn add<'a>(
        &mut self,
        matched: impl IntoIterator<Item = (&'a String, &'a String)>,
        tags: &TagSet,
    ) -> Result<(), CollectorError> {
        for (key, pattern) in matched {
            let re = Regex::new(pattern).map_err(|source| CollectorError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            self.matched.insert(key.clone(), re);
        }
        self.tags.extend_from(tags);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty() && self.tags.is_empty()
    }

    pub fn apply(&self, tags: &mut TagSet) {
        for (key, re) in &self.matched {
            let Some(value) = tags.get(key).map(str::to_string) else {
                continue;
            };
            let Some(caps) = re.captures(&value) else {
                continue;
            };
            for (i, name) in re.capture_names().enumerate().skip(1) {
                let (Some(name), Some(m)) = (name, caps.get(i)) else {
                    continue;
                };
                if !m.as_str().is_empty() {
                    tags.insert(name, m.as_str());
                }
            }
        }

        for (key, value) in self.tags.iter() {
            if value.is_empty() {
                tags.remove(key);
            } else {
                tags.insert(key, value);
            }
        }
    }
}
