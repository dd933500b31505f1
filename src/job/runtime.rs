//! Per-job running metrics: a small fixed-capacity throughput ring
//! (grounded on `perf::WriteBuffer`'s fixed-capacity batching discipline,
//! here applied to rate tracking instead of write coalescing) plus the
//! running-info snapshot the wire protocol's `JOB_STATUS` reports.

use std::collections::VecDeque;
use std::time::Duration;

use super::state::JobState;

/// A fixed-capacity sliding window of (elapsed, bytes) samples used to
/// compute a recent throughput average without retaining full history.
pub struct Averager {
    capacity: usize,
    samples: VecDeque<(Duration, u64)>,
}

impl Averager {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), samples: VecDeque::with_capacity(capacity) }
    }

    pub fn record(&mut self, elapsed: Duration, bytes: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((elapsed, bytes));
    }

    /// Bytes per second averaged over the retained window, or `0` if no
    /// samples or the window covers zero elapsed time.
    pub fn bytes_per_second(&self) -> f64 {
        let total_elapsed: f64 = self.samples.iter().map(|(d, _)| d.as_secs_f64()).sum();
        if total_elapsed <= 0.0 {
            return 0.0;
        }
        let total_bytes: u64 = self.samples.iter().map(|(_, b)| b).sum();
        total_bytes as f64 / total_elapsed
    }
}

/// Snapshot of a running (or just-finished) job, as reported by
/// `JOB_STATUS`.
#[derive(Debug, Clone)]
pub struct RunningInfo {
    pub state: JobState,
    pub bytes_written: u64,
    pub entries_written: u64,
    pub current_volume: u32,
    pub requested_volume_number: Option<u32>,
    pub error: Option<String>,
}

impl RunningInfo {
    pub fn new() -> Self {
        Self {
            state: JobState::None,
            bytes_written: 0,
            entries_written: 0,
            current_volume: 0,
            requested_volume_number: None,
            error: None,
        }
    }
}

impl Default for RunningInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averager_computes_rate_over_window() {
        let mut avg = Averager::new(3);
        avg.record(Duration::from_secs(1), 1000);
        avg.record(Duration::from_secs(1), 1000);
        assert_eq!(avg.bytes_per_second(), 1000.0);
    }

    #[test]
    fn averager_drops_oldest_past_capacity() {
        let mut avg = Averager::new(2);
        avg.record(Duration::from_secs(1), 10_000_000);
        avg.record(Duration::from_secs(1), 1000);
        avg.record(Duration::from_secs(1), 1000);
        assert_eq!(avg.bytes_per_second(), 1000.0);
    }

    #[test]
    fn empty_averager_is_zero() {
        assert_eq!(Averager::new(4).bytes_per_second(), 0.0);
    }
}
