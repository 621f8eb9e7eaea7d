//! Metrics primitives shared across the ndnft workspace.
//!
//! Counters and gauges are plain atomics so they can be read from any
//! thread while the pipeline worker and face threads update them.

use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Simple Counter
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Histogram
 * ---------------------------------------------------------------- */

/// Fixed-boundary histogram tracking sum and count alongside buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<u64>,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(boundaries: Vec<u64>) -> Self {
        let buckets = (0..boundaries.len()).map(|_| AtomicU64::new(0)).collect();

        Self {
            buckets,
            boundaries,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &b) in self.boundaries.iter().enumerate() {
            if value <= b {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average(&self) -> f64 {
        let c = self.count.load(Ordering::Relaxed);
        if c == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / c as f64
        }
    }

    pub fn counts(&self) -> Vec<(u64, u64)> {
        self.boundaries
            .iter()
            .zip(self.buckets.iter())
            .map(|(&b, bucket)| (b, bucket.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Microsecond-scale latency buckets
        Self::new(vec![10, 100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_and_gauge() {
        let c = Counter::new();
        c.increment();
        c.add(4);
        assert_eq!(c.value(), 5);

        let g = Gauge::new();
        g.set(3);
        g.increment();
        g.decrement();
        assert_eq!(g.value(), 3);
    }

    #[test]
    fn histogram_buckets_and_average() {
        let h = Histogram::new(vec![10, 100]);
        h.observe(5);
        h.observe(50);
        h.observe(500);

        assert_eq!(h.count(), 3);
        assert_eq!(h.sum(), 555);
        assert_eq!(h.counts(), vec![(10, 1), (100, 1)]);
        assert!((h.average() - 185.0).abs() < f64::EPSILON);
    }
}
