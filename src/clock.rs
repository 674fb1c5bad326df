// src/clock.rs

use chrono::{DateTime, TimeZone, Utc};

/// Source of "now" for request timestamps and the response freshness window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Whole seconds since the unix epoch.
    fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for deterministic signing.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Falls back to the epoch if `secs` is out of chrono's range.
    pub fn from_unix(secs: i64) -> Self {
        let at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_default();
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
