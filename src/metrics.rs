//! Per-operation metrics: a bounded, append-only ring buffer of
//! success/latency records.
//!
//! Single-writer/multi-reader per spec §5: [`MetricsRecorder::record`]
//! takes the write lock only for the duration of a push (and the
//! occasional drop-oldest), while [`MetricsRecorder::snapshot`] and the
//! aggregate query methods only ever need a read lock.

use std::time::Duration;

use parking_lot::RwLock;

/// The bounded capacity of a recorder's ring buffer; once full, the
/// oldest record is dropped to make room for the newest (spec §5:
/// "bounded to ≈1000 entries, drops oldest").
pub const DEFAULT_CAPACITY: usize = 1000;

/// One operation's outcome.
#[derive(Clone, Debug)]
pub struct MetricRecord {
    pub operation: &'static str,
    pub success: bool,
    pub latency: Duration,
    /// `None` on success; the error variant's name on failure (e.g.
    /// `"NoiseExceeded"`), kept as a label rather than the full
    /// `HecError` so this module never needs to depend on `error.rs`'s
    /// payload types.
    pub error_kind: Option<&'static str>,
}

/// A bounded ring buffer of [`MetricRecord`]s for one scheme or
/// subsystem instance.
pub struct MetricsRecorder {
    capacity: usize,
    records: RwLock<Vec<MetricRecord>>,
}

impl MetricsRecorder {
    pub fn new(capacity: usize) -> Self {
        MetricsRecorder { capacity: capacity.max(1), records: RwLock::new(Vec::new()) }
    }

    /// Record one operation's outcome, dropping the oldest entry first
    /// if the buffer is already at capacity.
    pub fn record(&self, operation: &'static str, success: bool, latency: Duration, error_kind: Option<&'static str>) {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.remove(0);
        }
        records.push(MetricRecord { operation, success, latency, error_kind });
    }

    /// A snapshot copy of every currently buffered record, oldest first.
    pub fn snapshot(&self) -> Vec<MetricRecord> {
        self.records.read().clone()
    }

    /// Count of recorded operations currently buffered (after drops).
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Success rate over the currently buffered records for `operation`,
    /// or `None` if none are buffered.
    pub fn success_rate(&self, operation: &str) -> Option<f64> {
        let records = self.records.read();
        let matching: Vec<&MetricRecord> = records.iter().filter(|r| r.operation == operation).collect();
        if matching.is_empty() {
            return None;
        }
        let successes = matching.iter().filter(|r| r.success).count();
        Some(successes as f64 / matching.len() as f64)
    }

    /// Mean latency over the currently buffered records for `operation`,
    /// or `None` if none are buffered.
    pub fn mean_latency(&self, operation: &str) -> Option<Duration> {
        let records = self.records.read();
        let matching: Vec<&MetricRecord> = records.iter().filter(|r| r.operation == operation).collect();
        if matching.is_empty() {
            return None;
        }
        let total: Duration = matching.iter().map(|r| r.latency).sum();
        Some(total / matching.len() as u32)
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        MetricsRecorder::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reports_success_rate() {
        let recorder = MetricsRecorder::new(10);
        recorder.record("encrypt", true, Duration::from_micros(10), None);
        recorder.record("encrypt", false, Duration::from_micros(20), Some("NoiseExceeded"));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.success_rate("encrypt"), Some(0.5));
    }

    #[test]
    fn drops_oldest_once_at_capacity() {
        let recorder = MetricsRecorder::new(3);
        for i in 0..5u32 {
            recorder.record("op", true, Duration::from_micros(i as u64), None);
        }
        assert_eq!(recorder.len(), 3);
        let snapshot = recorder.snapshot();
        // only the three most recent survive
        assert_eq!(snapshot[0].latency, Duration::from_micros(2));
        assert_eq!(snapshot[2].latency, Duration::from_micros(4));
    }

    #[test]
    fn unknown_operation_reports_none() {
        let recorder = MetricsRecorder::new(10);
        recorder.record("encrypt", true, Duration::from_micros(1), None);
        assert_eq!(recorder.success_rate("decrypt"), None);
        assert_eq!(recorder.mean_latency("decrypt"), None);
    }
}
