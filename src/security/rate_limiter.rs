use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Process-wide token bucket bounding the aggregate request rate.
///
/// Starts full. Each admitted request takes one token; tokens refill continuously
/// at `refill_per_second` up to `capacity`.
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self::starting_at(capacity, refill_per_second, Instant::now())
    }

    pub fn starting_at(capacity: u32, refill_per_second: f64, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: now,
            }),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token if available. Refill and consumption happen under one lock.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Give back a token taken for a request that a later check refused
    pub fn refund(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.tokens = (state.tokens + 1.0).min(self.capacity);
    }
}

/// Optional per-IP fixed-window limiter layered behind the global bucket
pub struct KeyedRateLimiter {
    requests: DashMap<IpAddr, (AtomicU32, AtomicI64)>,
    max_requests_per_minute: u32,
}

impl KeyedRateLimiter {
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            requests: DashMap::new(),
            max_requests_per_minute,
        }
    }

    pub fn check_and_increment(&self, ip: IpAddr, current_time: i64) -> bool {
        let entry = self.requests.entry(ip).or_insert_with(|| {
            (AtomicU32::new(0), AtomicI64::new(current_time))
        });

        let (count, window_start) = entry.value();
        let window_start_time = window_start.load(Ordering::Relaxed);

        if current_time - window_start_time >= 60 {
            window_start.store(current_time, Ordering::Relaxed);
            count.store(1, Ordering::Relaxed);
            return true;
        }

        let current_count = count.fetch_add(1, Ordering::Relaxed) + 1;

        current_count <= self.max_requests_per_minute
    }

    pub fn cleanup_old_entries(&self, current_time: i64) {
        self.requests.retain(|_, (_, window_start)| {
            current_time - window_start.load(Ordering::Relaxed) < 60
        });
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
