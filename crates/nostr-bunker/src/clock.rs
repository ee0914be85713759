use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source for cache TTLs, liveness checks and event timestamps.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds from an arbitrary origin.
    fn now_millis(&self) -> u64;

    /// Wall-clock seconds since the UNIX epoch, used for `created_at`.
    fn unix_timestamp(&self) -> u64;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn unix_timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    millis: AtomicU64,
    unix: AtomicU64,
}

impl ManualClock {
    pub fn new(unix_timestamp: u64) -> Self {
        Self {
            millis: AtomicU64::new(0),
            unix: AtomicU64::new(unix_timestamp),
        }
    }

    /// Advances both the monotonic and the wall clock.
    pub fn advance_millis(&self, millis: u64) {
        let total = self.millis.fetch_add(millis, Ordering::SeqCst) + millis;
        let seconds_before = (total - millis) / 1000;
        let seconds_after = total / 1000;
        self.unix
            .fetch_add(seconds_after - seconds_before, Ordering::SeqCst);
    }

    pub fn set_unix_timestamp(&self, unix_timestamp: u64) {
        self.unix.store(unix_timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn unix_timestamp(&self) -> u64 {
        self.unix.load(Ordering::SeqCst)
    }
}
