use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time for a [`crate::ReliabilityManager`].
///
/// Injected rather than called directly so that retry-aging (S6) and the
/// Lamport/wall-clock mixing in `wrapOutgoing` can be driven deterministically
/// in tests.
pub trait TimeProvider: Send + Sync {
    fn now_instant(&self) -> Instant;
    fn now_unix_seconds(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_unix_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A manual time provider for deterministic tests.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
    unix_seconds: RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant, unix_seconds: i64) -> Self {
        Self {
            instant: RwLock::new(instant),
            unix_seconds: RwLock::new(unix_seconds),
        }
    }

    pub fn set_time(&self, instant: Instant, unix_seconds: i64) {
        *self.instant.write().unwrap() = instant;
        *self.unix_seconds.write().unwrap() = unix_seconds;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
        *self.unix_seconds.write().unwrap() += duration.as_secs() as i64;
    }
}

impl Default for ManualTimeProvider {
    fn default() -> Self {
        Self::new(Instant::now(), 0)
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read().unwrap()
    }

    fn now_unix_seconds(&self) -> i64 {
        *self.unix_seconds.read().unwrap()
    }
}
