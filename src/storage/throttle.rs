//! Per-process bandwidth limiting shared by every backend, generalizing
//! `WriteBuffer`'s batching discipline (perf.rs) from "fewer, larger
//! syscalls" to "fewer, larger syscalls at a bounded rate": the bucket
//! still accumulates capacity and drains it in batches, but the batch
//! size is now time-gated rather than purely size-gated.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

impl Priority {
    /// Relative share of a shared bucket's refill. HIGH gets four times
    /// the tokens of LOW per refill tick when both are contending.
    fn weight(self) -> u64 {
        match self {
            Priority::Low => 1,
            Priority::High => 4,
        }
    }
}

struct Inner {
    capacity: u64,
    available: u64,
    rate_per_sec: u64,
    last_refill: Instant,
    low_waiters: u64,
    high_waiters: u64,
}

/// A token bucket limiting aggregate bytes/sec across all backends that
/// share one `Arc<TokenBucket>`. `take` blocks (sleeping in small steps)
/// until enough tokens are available, weighting the wait by `priority`
/// when the bucket is contended from both priorities at once.
pub struct TokenBucket {
    inner: Mutex<Inner>,
}

impl TokenBucket {
    /// `rate_per_sec` of 0 means unlimited: `take` always returns
    /// immediately.
    pub fn new(rate_per_sec: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                capacity: rate_per_sec.max(1),
                available: rate_per_sec,
                rate_per_sec,
                last_refill: Instant::now(),
                low_waiters: 0,
                high_waiters: 0,
            }),
        })
    }

    fn refill(inner: &mut Inner) {
        if inner.rate_per_sec == 0 {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill);
        let gained = (elapsed.as_secs_f64() * inner.rate_per_sec as f64) as u64;
        if gained > 0 {
            inner.available = (inner.available + gained).min(inner.capacity);
            inner.last_refill = now;
        }
    }

    /// Block until `want` bytes' worth of tokens are available, then
    /// consume them and return the amount actually granted (which is
    /// always `want` unless `want` exceeds bucket capacity, in which case
    /// it is capped to capacity for this call — callers retry for the
    /// remainder).
    pub fn take(&self, want: u64, priority: Priority) -> u64 {
        if want == 0 {
            return 0;
        }
        let want = want.min({
            let inner = self.inner.lock().unwrap();
            inner.capacity
        });

        loop {
            let mut inner = self.inner.lock().unwrap();
            if inner.rate_per_sec == 0 {
                return want;
            }
            Self::refill(&mut inner);

            let total_weight = inner.low_waiters.max(1) * Priority::Low.weight()
                + inner.high_waiters * Priority::High.weight();
            let share = if total_weight == 0 {
                inner.available
            } else {
                inner.available * priority.weight() / total_weight.max(1)
            };

            if inner.available >= want && share >= want.min(inner.available) {
                inner.available -= want;
                return want;
            }
            drop(inner);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_bucket_never_blocks() {
        let bucket = TokenBucket::new(0);
        let granted = bucket.take(10_000_000, Priority::Low);
        assert_eq!(granted, 10_000_000);
    }

    #[test]
    fn bucket_grants_up_to_capacity_immediately() {
        let bucket = TokenBucket::new(1024);
        let granted = bucket.take(500, Priority::High);
        assert_eq!(granted, 500);
    }
}
