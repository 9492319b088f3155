//! Latency percentile tracking using HdrHistogram.
//!
//! Every `ActionStats` record (see [`crate::metrics`]) owns one of these.
//! Values are recorded and read back in microseconds; the reporter converts to
//! milliseconds or seconds for display.

use hdrhistogram::Histogram;
use tracing::warn;

/// A snapshot of percentile statistics for a set of latency measurements, in
/// microseconds.
#[derive(Debug, Clone)]
pub struct PercentileStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

/// Latency histogram covering 1 microsecond to 60 seconds with 3
/// significant-digit precision.
pub struct PercentileTracker {
    histogram: Histogram<u64>,
}

impl PercentileTracker {
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("histogram bounds are valid");
        Self { histogram }
    }

    /// Record a latency in microseconds, clamping to the histogram's bounds.
    pub fn record_us(&mut self, latency_us: u64) {
        let clamped = latency_us.clamp(1, 60_000_000);
        if let Err(e) = self.histogram.record(clamped) {
            warn!(latency_us, error = %e, "failed to record latency sample");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn stats(&self) -> Option<PercentileStats> {
        if self.histogram.is_empty() {
            return None;
        }

        Some(PercentileStats {
            count: self.histogram.len(),
            min: self.histogram.min(),
            max: self.histogram.max(),
            mean: self.histogram.mean(),
            p50: self.histogram.value_at_quantile(0.50),
            p90: self.histogram.value_at_quantile(0.90),
            p95: self.histogram.value_at_quantile(0.95),
            p99: self.histogram.value_at_quantile(0.99),
        })
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a microsecond value per the reporter's display rule: sub-millisecond
/// values as integer microseconds, sub-second as integer milliseconds, else
/// seconds with one decimal.
pub fn format_latency_us(us: u64) -> String {
    if us < 1_000 {
        format!("{}us", us)
    } else if us < 1_000_000 {
        format!("{}ms", us / 1_000)
    } else {
        format!("{:.1}s", us as f64 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_has_no_stats() {
        let tracker = PercentileTracker::new();
        assert!(tracker.stats().is_none());
    }

    #[test]
    fn records_and_reports_percentiles() {
        let mut tracker = PercentileTracker::new();
        for i in 1..=5 {
            tracker.record_us(i * 10_000);
        }

        let stats = tracker.stats().expect("should have stats");
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 10_000);

        let tolerance = 100;
        assert!((stats.max as i64 - 50_000).unsigned_abs() <= tolerance);
    }

    #[test]
    fn clamps_outliers_to_histogram_bounds() {
        let mut tracker = PercentileTracker::new();
        tracker.record_us(120_000_000); // 120s, above the 60s ceiling
        let stats = tracker.stats().unwrap();
        assert!(stats.max <= 60_000_000);
    }

    #[test]
    fn formats_sub_millisecond_as_microseconds() {
        assert_eq!(format_latency_us(500), "500us");
    }

    #[test]
    fn formats_sub_second_as_milliseconds() {
        assert_eq!(format_latency_us(45_000), "45ms");
    }

    #[test]
    fn formats_seconds_with_one_decimal() {
        assert_eq!(format_latency_us(2_500_000), "2.5s");
    }
}
