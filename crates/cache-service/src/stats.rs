//! Cache statistics: atomic counters plus a point-in-time snapshot.
//!
//! Mirrors the engine's `EvaluationMetrics`/`snapshot()` shape — counters
//! stay atomic for the hot path, the snapshot is a plain `Copy` struct
//! callers can log or assert on without racing further updates.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// The most recent error message, stamped with the wall-clock time it
/// occurred.
#[derive(Debug, Clone)]
pub struct LastError {
    pub message: String,
    pub at: SystemTime,
}

#[derive(Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    operations: AtomicU64,
    total_latency_nanos: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

/// A point-in-time copy of [`CacheStats`], safe to log or export.
#[derive(Debug, Clone, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub operations: u64,
    pub average_latency: Duration,
    pub hit_ratio: f64,
    pub last_error: Option<LastError>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(LastError {
            message: message.into(),
            at: SystemTime::now(),
        });
    }

    /// Record that an operation of some kind ran and took `elapsed`.
    pub fn record_operation(&self, elapsed: Duration) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let operations = self.operations.load(Ordering::Relaxed);
        let total_latency_nanos = self.total_latency_nanos.load(Ordering::Relaxed);

        let hit_ratio = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        let average_latency = if operations == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(total_latency_nanos / operations)
        };

        CacheStatsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            operations,
            average_latency,
            hit_ratio,
            last_error: self.last_error.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_is_derived_from_counts() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let snap = stats.snapshot();
        assert_eq!(snap.hit_ratio, 0.75);
    }

    #[test]
    fn hit_ratio_is_zero_with_no_lookups() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_ratio, 0.0);
    }

    #[test]
    fn average_latency_divides_total_by_count() {
        let stats = CacheStats::new();
        stats.record_operation(Duration::from_millis(10));
        stats.record_operation(Duration::from_millis(30));
        let snap = stats.snapshot();
        assert_eq!(snap.average_latency, Duration::from_millis(20));
    }

    #[test]
    fn last_error_tracks_most_recent_message() {
        let stats = CacheStats::new();
        stats.record_error("first failure");
        stats.record_error("second failure");
        let snap = stats.snapshot();
        assert_eq!(snap.last_error.as_ref().map(|e| e.message.as_str()), Some("second failure"));
        assert_eq!(snap.errors, 2);
    }

    #[test]
    fn last_error_is_stamped_with_the_time_it_occurred() {
        let stats = CacheStats::new();
        let before = SystemTime::now();
        stats.record_error("failure");
        let snap = stats.snapshot();
        assert!(snap.last_error.unwrap().at >= before);
    }
}
