//! Recalculator configuration
//!
//! Sensible defaults with environment variable overrides.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::frecency::FrecencyParams;

/// Rows recalculated per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 50;
/// Delay between a wake-up and the chunk it triggers; coalesces bursts of writes
pub const DEFAULT_TASK_INTERVAL: Duration = Duration::from_millis(2000);
/// Period of the background "anything pending?" check
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Factor applied to page frecencies by the daily decay
pub const DEFAULT_DECAY_RATE: f64 = 0.975;

/// Frecency recalculator settings
#[derive(Debug, Clone, PartialEq)]
pub struct RecalculatorConfig {
    /// Maximum pages (and origins) per chunk
    pub chunk_size: usize,
    /// Deferred task delay
    pub task_interval: Duration,
    /// Check interval period
    pub check_interval: Duration,
    /// Daily decay factor, in (0, 1]
    pub decay_rate: f64,
    /// Formula tunables
    pub frecency: FrecencyParams,
}

impl Default for RecalculatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            task_interval: DEFAULT_TASK_INTERVAL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            decay_rate: DEFAULT_DECAY_RATE,
            frecency: FrecencyParams::default(),
        }
    }
}

impl RecalculatorConfig {
    /// Load from environment variables:
    /// - `PLACES_FRECENCY_CHUNK_SIZE`
    /// - `PLACES_FRECENCY_TASK_INTERVAL_MS`
    /// - `PLACES_FRECENCY_CHECK_INTERVAL_SECS`
    /// - `PLACES_FRECENCY_DECAY_RATE`
    ///
    /// Unparseable or out-of-range values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize>("PLACES_FRECENCY_CHUNK_SIZE") {
            if size > 0 {
                config.chunk_size = size;
            } else {
                log::warn!("PLACES_FRECENCY_CHUNK_SIZE must be positive, keeping {}", config.chunk_size);
            }
        }

        if let Some(ms) = parse_var::<u64>("PLACES_FRECENCY_TASK_INTERVAL_MS") {
            config.task_interval = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64>("PLACES_FRECENCY_CHECK_INTERVAL_SECS") {
            if secs > 0 {
                config.check_interval = Duration::from_secs(secs);
            } else {
                log::warn!("PLACES_FRECENCY_CHECK_INTERVAL_SECS must be positive, ignoring");
            }
        }

        if let Some(rate) = parse_var::<f64>("PLACES_FRECENCY_DECAY_RATE") {
            if rate > 0.0 && rate <= 1.0 {
                config.decay_rate = rate;
            } else {
                log::warn!("PLACES_FRECENCY_DECAY_RATE must be in (0, 1], got {}", rate);
            }
        }

        log::info!(
            "Frecency recalculation: chunk_size={}, task_interval={:?}, check_interval={:?}, decay_rate={}",
            config.chunk_size,
            config.task_interval,
            config.check_interval,
            config.decay_rate
        );
        config
    }

    /// Set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the deferred task delay
    pub fn with_task_interval(mut self, interval: Duration) -> Self {
        self.task_interval = interval;
        self
    }

    /// Set the check interval period
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecalculatorConfig::default();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.task_interval, Duration::from_secs(2));
        assert_eq!(config.decay_rate, 0.975);
    }

    #[test]
    fn test_builders() {
        let config = RecalculatorConfig::default()
            .with_chunk_size(5)
            .with_task_interval(Duration::from_millis(10))
            .with_check_interval(Duration::from_secs(1));
        assert_eq!(config.chunk_size, 5);
        assert_eq!(config.task_interval, Duration::from_millis(10));
        assert_eq!(config.check_interval, Duration::from_secs(1));
    }

    // All env cases live in one test so parallel tests never race on the
    // process environment.
    #[test]
    fn test_from_env_overrides() {
        unsafe {
            env::set_var("PLACES_FRECENCY_CHUNK_SIZE", "7");
            env::set_var("PLACES_FRECENCY_TASK_INTERVAL_MS", "250");
            env::set_var("PLACES_FRECENCY_CHECK_INTERVAL_SECS", "0");
            env::set_var("PLACES_FRECENCY_DECAY_RATE", "1.5");
        }

        let config = RecalculatorConfig::from_env();
        assert_eq!(config.chunk_size, 7);
        assert_eq!(config.task_interval, Duration::from_millis(250));
        assert_eq!(config.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(config.decay_rate, DEFAULT_DECAY_RATE);

        unsafe {
            env::set_var("PLACES_FRECENCY_CHUNK_SIZE", "lots");
        }
        assert_eq!(RecalculatorConfig::from_env().chunk_size, DEFAULT_CHUNK_SIZE);

        unsafe {
            env::remove_var("PLACES_FRECENCY_CHUNK_SIZE");
            env::remove_var("PLACES_FRECENCY_TASK_INTERVAL_MS");
            env::remove_var("PLACES_FRECENCY_CHECK_INTERVAL_SECS");
            env::remove_var("PLACES_FRECENCY_DECAY_RATE");
        }
    }
}
