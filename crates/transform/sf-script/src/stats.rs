//! Transformer statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by every thread applying one transformer.
#[derive(Debug, Default)]
pub struct TransformStats {
    /// Records transformed successfully
    records_applied: AtomicU64,

    /// Records whose transformation failed
    records_failed: AtomicU64,

    /// Script runtimes created (one per thread that applied records)
    runtimes_created: AtomicU64,

    /// Time spent creating runtimes and compiling scripts (in microseconds)
    compile_time_us: AtomicU64,
}

impl TransformStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully transformed record.
    pub fn record_success(&self) {
        self.records_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed record.
    pub fn record_failure(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly compiled runtime and how long it took.
    pub fn record_runtime(&self, duration: Duration) {
        self.runtimes_created.fetch_add(1, Ordering::Relaxed);
        self.compile_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn records_applied(&self) -> u64 {
        self.records_applied.load(Ordering::Relaxed)
    }

    pub fn records_failed(&self) -> u64 {
        self.records_failed.load(Ordering::Relaxed)
    }

    pub fn runtimes_created(&self) -> u64 {
        self.runtimes_created.load(Ordering::Relaxed)
    }

    pub fn compile_time(&self) -> Duration {
        Duration::from_micros(self.compile_time_us.load(Ordering::Relaxed))
    }

    /// Create a snapshot of the current statistics.
    pub fn snapshot(&self) -> TransformStatsSnapshot {
        TransformStatsSnapshot {
            records_applied: self.records_applied(),
            records_failed: self.records_failed(),
            runtimes_created: self.runtimes_created(),
            compile_time: self.compile_time(),
        }
    }
}

/// Point-in-time copy of [`TransformStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStatsSnapshot {
    pub records_applied: u64,
    pub records_failed: u64,
    pub runtimes_created: u64,
    pub compile_time: Duration,
}

impl TransformStatsSnapshot {
    /// Total records seen, successful or not.
    pub fn records_total(&self) -> u64 {
        self.records_applied + self.records_failed
    }

    /// Fraction of records that failed, 0.0 when nothing was applied.
    pub fn failure_rate(&self) -> f64 {
        let total = self.records_total();
        if total == 0 {
            0.0
        } else {
            self.records_failed as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = TransformStats::new();
        stats.record_success();
        stats.record_success();
        stats.record_failure();
        stats.record_runtime(Duration::from_millis(3));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_applied, 2);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.runtimes_created, 1);
        assert_eq!(snapshot.compile_time, Duration::from_millis(3));
        assert_eq!(snapshot.records_total(), 3);
    }

    #[test]
    fn test_failure_rate() {
        assert_eq!(TransformStatsSnapshot::default().failure_rate(), 0.0);

        let snapshot = TransformStatsSnapshot {
            records_applied: 3,
            records_failed: 1,
            ..Default::default()
        };
        assert!((snapshot.failure_rate() - 0.25).abs() < f64::EPSILON);
    }
}
