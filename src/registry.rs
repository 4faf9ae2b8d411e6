//! Named collectors known to the agent, with filter search and tag overrides

use regex::Regex;
use tracing::debug;

use crate::collector::Collector;
use crate::config::TagOverrideConfig;
use crate::error::CollectorError;

/// Ordered set of known collectors
#[derive(Debug, Default)]
pub struct Registry {
    collectors: Vec<Collector>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collector. Names must be unique.
    pub fn register(&mut self, collector: Collector) -> Result<(), CollectorError> {
        if self.collectors.iter().any(|c| c.name() == collector.name()) {
            return Err(CollectorError::DuplicateName(collector.name().to_string()));
        }
        debug!("registered {} collector {}", collector.kind(), collector.name());
        self.collectors.push(collector);
        Ok(())
    }

    /// Collectors whose name contains at least one of `patterns`, in
    /// registration order. No patterns selects everything.
    pub fn search<S: AsRef<str>>(&self, patterns: &[S]) -> Vec<Collector> {
        self.collectors
            .iter()
            .filter(|c| {
                patterns.is_empty() || patterns.iter().any(|p| c.name().contains(p.as_ref()))
            })
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(Collector::name).collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collector> {
        self.collectors.iter()
    }

    /// Attaches every override to the collectors its `collector_expr` matches.
    pub fn apply_tag_overrides(
        &mut self,
        overrides: &[TagOverrideConfig],
    ) -> Result<(), CollectorError> {
        for o in overrides {
            let expr =
                Regex::new(&o.collector_expr).map_err(|source| CollectorError::InvalidPattern {
                    pattern: o.collector_expr.clone(),
                    source,
                })?;

            for collector in self.collectors.iter_mut().filter(|c| expr.is_match(c.name())) {
                debug!("tag override {} applies to {}", o.collector_expr, collector.name());
                collector.add_tag_overrides(&o.matched_tags, &o.tags)?;
            }
        }
        Ok(())
    }
}
