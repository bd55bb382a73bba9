//! Time abstraction for testability
//!
//! Provides a trait-based approach to wall-clock access that allows for
//! deterministic testing without relying on actual time passage. The
//! scheduler and the state store both take `now` from a [`Clock`] so tests
//! can walk a campaign through its whole retry window in microseconds.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Trait for wall-clock access to enable testing
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock implementation
///
/// Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Starts at a fixed instant and only moves when advanced. Clones share the
/// same underlying time.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock starting at the current real time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a mock clock starting at a specific instant
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(start)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, delta: Duration) {
        // Test utility: panic on poisoned mutex to fail tests early
        let mut current = self.current.lock().expect("mutex poisoned");
        *current += delta;
    }

    /// Set the mock clock to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        // Test utility: panic on poisoned mutex to fail tests early
        let mut current = self.current.lock().expect("mutex poisoned");
        *current = to;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        // Test utility: panic on poisoned mutex to fail tests early
        *self.current.lock().expect("mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_mock_clock_advance() {
        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = MockClock::at(start);

        clock.advance(Duration::hours(5));
        assert_eq!(clock.now(), start + Duration::hours(5));

        clock.advance(Duration::hours(19));
        assert_eq!(clock.now(), start + Duration::hours(24));
    }

    #[test]
    fn test_mock_clock_set() {
        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = MockClock::at(start);
        let target = start + Duration::days(3);

        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_mock_clock_clones_share_time() {
        let clock1 = MockClock::new();
        let clock2 = clock1.clone();

        clock1.advance(Duration::minutes(10));
        assert_eq!(clock1.now(), clock2.now());
    }
}
