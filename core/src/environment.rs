//! Environment traits injected into the services.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// The dinner start gate ("may only start once the scheduled time has
/// passed") and every `created_at` stamp go through this trait so tests can
/// pin time with a fixed clock.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
