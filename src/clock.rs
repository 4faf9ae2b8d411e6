//! Timestamp source for emitted points
//!
//! Collectors emit many points in tight loops; [`CachedClock`] amortizes clock
//! reads by refreshing a shared cell once per second from its own task. Without
//! that task running it stands still, so anything that cannot start one uses
//! [`SystemClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::trace;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync {
    /// Current time in Unix seconds
    fn now(&self) -> i64;
}

/// Reads the wall clock on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Wall clock snapshot refreshed by a background ticker
#[derive(Debug)]
pub struct CachedClock {
    now: AtomicI64,
}

impl CachedClock {
    pub fn new() -> Self {
        Self {
            now: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    /// Starts the refresh task. It stops when `cancel` fires.
    pub fn spawn_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let clock = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => clock.refresh(),
                    _ = cancel.cancelled() => break,
                }
            }
            trace!("clock refresh stopped");
        })
    }

    fn refresh(&self) {
        self.now.store(Utc::now().timestamp(), Ordering::Relaxed);
    }
}

impl Default for CachedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for CachedClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}
