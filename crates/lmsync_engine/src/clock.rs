//! Clock abstraction for document timestamps.
//!
//! The engine stamps `ctime`/`mtime` through a [`Clock`] so that cycles are
//! testable without real time.

use chrono::Utc;
use parking_lot::RwLock;

/// LibreMap timestamp layout: UTC with millisecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Supplies timestamps for document creation and update times.
pub trait Clock: Send + Sync {
    /// The current time as a LibreMap timestamp string.
    fn now(&self) -> String;
}

/// A clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A clock that returns a preset timestamp, for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<String>,
}

impl FixedClock {
    /// Creates a fixed clock at the given timestamp.
    pub fn new(now: impl Into<String>) -> Self {
        Self {
            now: RwLock::new(now.into()),
        }
    }

    /// Advances the clock to a new timestamp.
    pub fn set(&self, now: impl Into<String>) {
        *self.now.write() = now.into();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.now.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_format() {
        let now = SystemClock.now();
        // e.g. 2024-05-01T12:34:56.789Z
        assert_eq!(now.len(), 24);
        assert_eq!(&now[10..11], "T");
        assert!(now.ends_with('Z'));
    }

    #[test]
    fn fixed_clock_is_settable() {
        let clock = FixedClock::new("2024-01-01T00:00:00.000Z");
        assert_eq!(clock.now(), "2024-01-01T00:00:00.000Z");

        clock.set("2024-01-02T00:00:00.000Z");
        assert_eq!(clock.now(), "2024-01-02T00:00:00.000Z");
    }
}
