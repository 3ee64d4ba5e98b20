//! Request latency sampling.
//!
//! Each endpoint keeps a fixed-capacity ring of recent request durations.
//! Readers take a snapshot and compute average and tail percentiles from
//! it; a snapshot may miss inserts that are in flight.

use std::sync::Mutex;
use std::time::Duration;

/// Samples retained per endpoint.
pub const SAMPLE_CAPACITY: usize = 1500;

/// Aggregate view over the sampled durations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub avg: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Fixed-capacity reservoir of recent request durations.
pub struct TimerMetrics {
    ring: Mutex<Ring>,
}

struct Ring {
    samples: Vec<Duration>,
    pos: usize,
    capacity: usize,
}

impl TimerMetrics {
    pub fn new() -> Self {
        Self::with_capacity(SAMPLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                samples: Vec::with_capacity(capacity),
                pos: 0,
                capacity,
            }),
        }
    }

    /// Records one request duration, displacing the oldest sample once the
    /// reservoir is full.
    pub fn record(&self, duration: Duration) {
        let mut ring = self.ring.lock().unwrap();
        if ring.samples.len() < ring.capacity {
            ring.samples.push(duration);
        } else {
            let pos = ring.pos;
            ring.samples[pos] = duration;
        }
        ring.pos = (ring.pos + 1) % ring.capacity;
    }

    /// Average and nearest-rank tail percentiles over a snapshot of the
    /// reservoir. All zero when nothing has been recorded.
    pub fn stats(&self) -> TimingStats {
        let mut samples = self.ring.lock().unwrap().samples.clone();
        if samples.is_empty() {
            return TimingStats::default();
        }
        samples.sort_unstable();
        let total: Duration = samples.iter().sum();
        let avg = total / samples.len() as u32;
        TimingStats {
            avg,
            p95: samples[percentile_index(samples.len(), 95)],
            p99: samples[percentile_index(samples.len(), 99)],
        }
    }
}

impl Default for TimerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile_index(len: usize, pct: usize) -> usize {
    (len * pct / 100).min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_are_zero() {
        let metrics = TimerMetrics::new();
        assert_eq!(metrics.stats(), TimingStats::default());
    }

    #[test]
    fn test_stats_ordering() {
        let metrics = TimerMetrics::new();
        for micros in 1..=100u64 {
            metrics.record(Duration::from_micros(micros));
        }
        let stats = metrics.stats();
        assert!(stats.avg <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert_eq!(stats.p95, Duration::from_micros(96));
        assert_eq!(stats.p99, Duration::from_micros(100));
        assert_eq!(stats.avg, Duration::from_nanos(50_500));
    }

    #[test]
    fn test_ring_displaces_oldest() {
        let metrics = TimerMetrics::with_capacity(4);
        for micros in [1000u64, 1000, 1000, 1000, 1, 1, 1, 1] {
            metrics.record(Duration::from_micros(micros));
        }
        // The four large samples have been displaced.
        let stats = metrics.stats();
        assert_eq!(stats.p99, Duration::from_micros(1));
        assert_eq!(stats.avg, Duration::from_micros(1));
    }

    #[test]
    fn test_single_sample() {
        let metrics = TimerMetrics::new();
        metrics.record(Duration::from_micros(42));
        let stats = metrics.stats();
        assert_eq!(stats.avg, Duration::from_micros(42));
        assert_eq!(stats.p95, Duration::from_micros(42));
        assert_eq!(stats.p99, Duration::from_micros(42));
    }
}
