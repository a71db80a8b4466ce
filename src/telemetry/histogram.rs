//! In-memory timing histogram

use std::sync::Mutex;
use std::time::Duration;

/// Summary of the samples recorded so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub count: usize,
    pub sum: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl HistogramSnapshot {
    /// Mean sample value
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

/// Number of exponential buckets. Bucket `i > 0` holds samples in
/// `[2^(i-1), 2^i)`; the last bucket is open-ended.
pub const BUCKET_COUNT: usize = 16;

#[derive(Debug, Default)]
struct Accumulated {
    buckets: [u64; BUCKET_COUNT],
    snapshot: HistogramSnapshot,
}

/// Histogram of millisecond timings identified by a fixed id
pub struct TimingHistogram {
    id: &'static str,
    data: Mutex<Accumulated>,
}

impl TimingHistogram {
    /// Create an empty histogram
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            data: Mutex::new(Accumulated::default()),
        }
    }

    /// Histogram id
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Record one sample in milliseconds
    pub fn record(&self, millis: u64) {
        if let Ok(mut data) = self.data.lock() {
            data.buckets[bucket_index(millis)] += 1;
            let snapshot = &mut data.snapshot;
            snapshot.count += 1;
            snapshot.sum = snapshot.sum.saturating_add(millis);
            snapshot.min = Some(snapshot.min.map_or(millis, |m| m.min(millis)));
            snapshot.max = Some(snapshot.max.map_or(millis, |m| m.max(millis)));
        }
        log::trace!("{} += {}ms", self.id, millis);
    }

    /// Record an elapsed duration
    pub fn record_duration(&self, elapsed: Duration) {
        self.record(elapsed.as_millis().try_into().unwrap_or(u64::MAX));
    }

    /// Number of recorded samples
    pub fn sample_count(&self) -> usize {
        self.data.lock().map(|d| d.snapshot.count).unwrap_or(0)
    }

    /// Get summary
    pub fn snapshot(&self) -> HistogramSnapshot {
        self.data.lock().map(|d| d.snapshot).unwrap_or_default()
    }

    /// Non-empty buckets as `(lower bound in ms, sample count)`
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        let Ok(data) = self.data.lock() else {
            return Vec::new();
        };
        data.buckets
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(i, count)| (bucket_lower_bound(i), *count))
            .collect()
    }

    /// Clear all data
    pub fn clear(&self) {
        if let Ok(mut data) = self.data.lock() {
            *data = Accumulated::default();
        }
    }
}

fn bucket_index(millis: u64) -> usize {
    let bits = (u64::BITS - millis.leading_zeros()) as usize;
    bits.min(BUCKET_COUNT - 1)
}

fn bucket_lower_bound(index: usize) -> u64 {
    if index == 0 { 0 } else { 1 << (index - 1) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_creation() {
        let histogram = TimingHistogram::new("TEST_MS");
        assert_eq!(histogram.id(), "TEST_MS");
        assert_eq!(histogram.sample_count(), 0);
        assert_eq!(histogram.snapshot().mean(), None);
    }

    #[test]
    fn test_histogram_snapshot() {
        let histogram = TimingHistogram::new("TEST_MS");
        histogram.record(4);
        histogram.record(10);
        histogram.record_duration(Duration::from_millis(1));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.sum, 15);
        assert_eq!(snapshot.min, Some(1));
        assert_eq!(snapshot.max, Some(10));
        assert_eq!(snapshot.mean(), Some(5.0));
    }

    #[test]
    fn test_histogram_clear() {
        let histogram = TimingHistogram::new("TEST_MS");
        histogram.record(1);
        histogram.clear();
        assert_eq!(histogram.sample_count(), 0);
        assert!(histogram.buckets().is_empty());
    }

    #[test]
    fn test_histogram_buckets() {
        let histogram = TimingHistogram::new("TEST_MS");
        for millis in [0, 1, 3, 3, 5, 1_000_000] {
            histogram.record(millis);
        }

        assert_eq!(
            histogram.buckets(),
            vec![(0, 1), (1, 1), (2, 2), (4, 1), (1 << (BUCKET_COUNT - 2), 1)]
        );
        assert_eq!(histogram.snapshot().max, Some(1_000_000));
    }
}
