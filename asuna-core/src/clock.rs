//! Time and environment seams.
//!
//! The stage clock and the scheduler never read the wall clock directly;
//! they go through [`Clock`] so tests can drive time by hand.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A hand-driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Sensors the character can consult about the host environment.
///
/// No real filesystem scanning lives in the core; integrations provide
/// their own implementation.
pub trait EnvironmentSensor: Send + Sync {
    /// Whether the desktop currently looks cluttered.
    fn desktop_cluttered(&self) -> bool;
}

/// Sensor that never detects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensor;

impl EnvironmentSensor for NoSensor {
    fn desktop_cluttered(&self) -> bool {
        false
    }
}

/// Sensor with a fixed answer, handy for wiring tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSensor(pub bool);

impl EnvironmentSensor for FixedSensor {
    fn desktop_cluttered(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();
        clock.advance(Duration::seconds(90));
        assert_eq!(other.now(), start + Duration::seconds(90));
    }

    #[test]
    fn no_sensor_sees_nothing() {
        assert!(!NoSensor.desktop_cluttered());
        assert!(FixedSensor(true).desktop_cluttered());
    }
}
