//! Exponential backoff with jitter
//!
//! Shared by the connector (between connection attempts inside a cycle) and
//! the retrying output. The connector waits through [`BackoffConfig::pause`],
//! which gives up as soon as shutdown is signaled.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

const FALLBACK_SEED: u64 = 0x853c49e6748fea9b;

/// Lock-free xorshift64 PRNG for jitter
struct Xorshift64 {
    state: AtomicU64,
}

impl Xorshift64 {
    fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(FALLBACK_SEED);
        // xorshift never leaves zero
        let seed = if seed == 0 { FALLBACK_SEED } else { seed };
        Self {
            state: AtomicU64::new(seed),
        }
    }

    fn next(&self) -> u64 {
        loop {
            let old = self.state.load(Ordering::Acquire);
            let mut x = old;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            if self
                .state
                .compare_exchange_weak(old, x, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return x;
            }
        }
    }

    /// Random f64 in [0.0, 1.0)
    fn next_f64(&self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }
}

static JITTER_RNG: LazyLock<Xorshift64> = LazyLock::new(Xorshift64::new);

fn rand_jitter() -> f64 {
    JITTER_RNG.next_f64()
}

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Retries after the first attempt (0 = try once)
    pub max_attempts: u32,
    /// Randomizes each delay by +/- this fraction (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 3,
            jitter_factor: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Delay before attempt `attempt` (0-indexed, attempt 0 never waits)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_for_attempt_with_jitter(attempt, rand_jitter())
    }

    /// Same as [`delay_for_attempt`](Self::delay_for_attempt) with a fixed
    /// jitter sample in [0.0, 1.0]; 0.5 means no jitter
    pub fn delay_for_attempt_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_us = self.initial_delay.as_micros() as f64 * self.multiplier.powi(exponent);
        let base_us = base_us.min(self.max_delay.as_micros() as f64);

        let jitter_range = base_us * self.jitter_factor;
        let jitter_offset = (jitter * 2.0 - 1.0) * jitter_range;
        let final_us = (base_us + jitter_offset).max(1.0);

        Duration::from_micros(final_us as u64)
    }

    /// Sleep before attempt `attempt` unless `shutdown` fires first
    ///
    /// Returns `false` when shutdown cut the wait short (or was already
    /// signaled), `true` once the full delay has elapsed.
    pub async fn pause(&self, attempt: u32, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        let delay = self.delay_for_attempt(attempt);
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
