use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Instant;

#[derive(Debug)]
struct InnerMetrics {
    events_consumed: AtomicU64,
    rows_appended: AtomicU64,
    rows_rejected: AtomicU64,
    batches_flushed: AtomicU64,
    checkpoint_writes: AtomicU64,
    retry_count: AtomicU64,
    failure_count: AtomicU64,
    started_at: Instant,
}

impl Default for InnerMetrics {
    fn default() -> Self {
        Self {
            events_consumed: AtomicU64::new(0),
            rows_appended: AtomicU64::new(0),
            rows_rejected: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            checkpoint_writes: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

/// Per-mapping counters, shared between the consumer task and whoever reports
/// health/stats (§6 "get_stats"). Cheap to clone; all mutation is lock-free.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub events_consumed: u64,
    pub rows_appended: u64,
    pub rows_rejected: u64,
    pub batches_flushed: u64,
    pub checkpoint_writes: u64,
    pub retry_count: u64,
    pub failure_count: u64,
    /// `events_consumed` divided by wall-clock seconds since the mapping
    /// started; a supplemental diagnostic stat, not used for any decision.
    pub messages_per_second: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_events_consumed(&self, count: u64) {
        self.inner.events_consumed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rows_appended(&self, count: u64) {
        self.inner.rows_appended.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rows_rejected(&self, count: u64) {
        self.inner.rows_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch_flushed(&self) {
        self.inner.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_write(&self) {
        self.inner.checkpoint_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.inner.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let events_consumed = self.inner.events_consumed.load(Ordering::Relaxed);
        let elapsed = self.inner.started_at.elapsed().as_secs_f64();
        let messages_per_second = if elapsed > 0.0 {
            events_consumed as f64 / elapsed
        } else {
            0.0
        };

        MetricsSnapshot {
            events_consumed,
            rows_appended: self.inner.rows_appended.load(Ordering::Relaxed),
            rows_rejected: self.inner.rows_rejected.load(Ordering::Relaxed),
            batches_flushed: self.inner.batches_flushed.load(Ordering::Relaxed),
            checkpoint_writes: self.inner.checkpoint_writes.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
            messages_per_second,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let m = Metrics::new();
        m.record_events_consumed(10);
        m.record_rows_appended(9);
        m.record_rows_rejected(1);
        m.record_batch_flushed();
        m.record_checkpoint_write();
        m.record_retry();

        let snap = m.snapshot();
        assert_eq!(snap.events_consumed, 10);
        assert_eq!(snap.rows_appended, 9);
        assert_eq!(snap.rows_rejected, 1);
        assert_eq!(snap.batches_flushed, 1);
        assert_eq!(snap.checkpoint_writes, 1);
        assert_eq!(snap.retry_count, 1);
    }

    #[test]
    fn clones_share_the_same_counters() {
        let m = Metrics::new();
        let clone = m.clone();
        clone.record_events_consumed(5);
        assert_eq!(m.snapshot().events_consumed, 5);
    }
}
