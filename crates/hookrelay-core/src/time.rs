//! Clock abstraction for timestamps, backoff waits and poll intervals.
//!
//! The engine never reads the system clock or creates timers directly; it
//! goes through a `Clock` so tests can run whole retry schedules in virtual
//! time.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Source of time for the delivery engine.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current wall-clock time for stored timestamps.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Waits for the specified duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by system time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock for deterministic tests.
///
/// `sleep` advances the clock by the requested duration and yields once, so
/// a full retry schedule measured in days completes immediately. Clones share
/// the same underlying time.
#[derive(Debug, Clone)]
pub struct TestClock {
    elapsed_ns: Arc<AtomicU64>,
    wall_ns: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock starting at a specific wall-clock time.
    pub fn with_start_time(start: SystemTime) -> Self {
        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            wall_ns: Arc::new(AtomicU64::new(nanos(
                start.duration_since(UNIX_EPOCH).unwrap_or_default(),
            ))),
        }
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let ns = nanos(duration);
        self.elapsed_ns.fetch_add(ns, Ordering::AcqRel);
        self.wall_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Total virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let wall = UNIX_EPOCH + Duration::from_nanos(self.wall_ns.load(Ordering::Acquire));
        DateTime::<Utc>::from(wall)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
