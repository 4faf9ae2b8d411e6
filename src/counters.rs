//! Free-running self-monitoring counters
//!
//! Any collector may bump a counter; the `scollector` builtin flushes the
//! whole map as `scollector.<key>` gauges every interval.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Counters {
    values: Mutex<HashMap<String, i64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, key: &str, amount: i64) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        *values.entry(key.to_string()).or_insert(0) += amount;
    }

    pub fn get(&self, key: &str) -> i64 {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).copied().unwrap_or_default()
    }

    /// Current values sorted by key
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = values.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort();
        out
    }
}
