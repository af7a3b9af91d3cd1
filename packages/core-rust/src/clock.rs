use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the wall clock, so audit timestamps are deterministic in tests.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock set before 1970 reports 0 rather than failing the call.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Clock that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl ClockSource for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}
