//! Per-connection resource governor.
//!
//! Each accepted connection owns one [`ConnContext`] tracking two limits:
//!
//! - a byte quota over the connection's read buffer, reserved before bytes
//!   are appended and released when frames are consumed;
//! - a token bucket limiting the rate of complete frames.
//!
//! The context is private to its connection. The byte counter uses atomics
//! so the quota stays correct if a handler ever shares it across tasks; the
//! token bucket sits behind a plain mutex since a lock-free refill buys
//! nothing for a single-owner bucket.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Default read-buffer quota per connection: 256 KiB.
pub const DEFAULT_MAX_BUFFER: i64 = 256 * 1024;

/// Default initial token count.
pub const DEFAULT_TOKENS: i64 = 100;

/// Default refill rate in tokens per second.
pub const DEFAULT_RATE: i64 = 100;

/// Default burst ceiling.
pub const DEFAULT_BURST: i64 = 200;

/// Per-connection buffered-bytes quota and frame-rate limiter.
#[derive(Debug)]
pub struct ConnContext {
    buffer_used: AtomicI64,
    max_buffer: i64,
    bucket: Mutex<TokenBucket>,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: i64,
    last_refill: Instant,
    rate: i64,
    burst: i64,
}

impl ConnContext {
    /// Create a context with the default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BUFFER, DEFAULT_TOKENS, DEFAULT_RATE, DEFAULT_BURST)
    }

    /// Create a context with explicit limits.
    pub fn with_limits(max_buffer: i64, tokens: i64, rate: i64, burst: i64) -> Self {
        Self {
            buffer_used: AtomicI64::new(0),
            max_buffer,
            bucket: Mutex::new(TokenBucket {
                tokens,
                last_refill: Instant::now(),
                rate,
                burst,
            }),
        }
    }

    /// Reserve `n` bytes of buffer quota.
    ///
    /// Returns `true` iff the post-increment usage is within the quota. A
    /// `false` return is fatal for the connection: the counter stays
    /// incremented and is reclaimed wholesale when the handler's context is
    /// dropped.
    pub fn reserve(&self, n: usize) -> bool {
        let used = self.buffer_used.fetch_add(n as i64, Ordering::AcqRel) + n as i64;
        used <= self.max_buffer
    }

    /// Release `n` bytes of previously reserved quota.
    pub fn release(&self, n: usize) {
        self.buffer_used.fetch_sub(n as i64, Ordering::AcqRel);
    }

    /// Bytes currently reserved.
    pub fn buffered_bytes(&self) -> i64 {
        self.buffer_used.load(Ordering::Acquire)
    }

    /// Take one token from the rate limiter.
    ///
    /// Elapsed time refills the bucket at `rate` tokens per second, capped
    /// at `burst`. Returns `false` when the bucket is empty.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_nanos() as i64;
        let add = elapsed * bucket.rate / 1_000_000_000;
        if add > 0 {
            bucket.tokens = (bucket.tokens + add).min(bucket.burst);
            bucket.last_refill = now;
        }

        if bucket.tokens <= 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

impl Default for ConnContext {
    fn default() -> Self {
        Self::new()
    }
}
