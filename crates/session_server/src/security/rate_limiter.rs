//! Rate limiting implementation using token bucket algorithm.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Token bucket rate limiter keyed by remote IP.
///
/// Each address starts with `max_tokens` tokens and regains one per
/// `refill_interval`, up to the maximum.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, TokenBucket>,
    max_tokens: u32,
    refill_interval: Duration,
    blocked_count: AtomicU64,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified parameters
    pub fn new(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max_tokens,
            refill_interval,
            blocked_count: AtomicU64::new(0),
        }
    }

    /// Consumes a token for `ip`, returning `false` when the bucket is empty.
    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        self.check_rate_limit_at(ip, Instant::now())
    }

    pub(crate) fn check_rate_limit_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut bucket = self.buckets.entry(ip).or_insert(TokenBucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if !self.refill_interval.is_zero() && elapsed >= self.refill_interval {
            let intervals_passed = elapsed.as_nanos() / self.refill_interval.as_nanos();
            let missing = self.max_tokens - bucket.tokens;
            let tokens_to_add = intervals_passed.min(missing as u128) as u32;
            bucket.tokens += tokens_to_add;
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Gets the total number of blocked requests
    pub fn blocked_count(&self) -> u64 {
        self.blocked_count.load(Ordering::Relaxed)
    }

    /// Drops buckets that have not been touched for `max_age`.
    pub fn cleanup_old_entries(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < max_age);
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}
