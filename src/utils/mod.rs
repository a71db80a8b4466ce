//! Shared utilities and error types

pub mod error;

pub use error::{PlacesError, Result, SchedulerError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds in one day, the unit of visit dates
pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_micros_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(now_micros() > 1_577_836_800_000_000);
    }
}
