//! Backoff policies used between failing attempts.
//!
//! `attempt` is the zero-based index of the attempt that just failed, so the
//! first wait is `next_interval(0)`. All computations saturate at
//! [`MAX_BACKOFF`] instead of overflowing.
//!
//! ```rust
//! use std::time::Duration;
//! use resilient_http::{ExponentialBackoff, Retrier};
//!
//! let backoff = ExponentialBackoff::new(Duration::from_millis(100)).with_max(Duration::from_secs(1));
//! assert_eq!(backoff.next_interval(0), Duration::from_millis(100));
//! assert_eq!(backoff.next_interval(1), Duration::from_millis(200));
//! assert_eq!(backoff.next_interval(10), Duration::from_secs(1));
//! ```

use std::fmt;
use std::time::Duration;

use rand::Rng;

/// Upper bound for any computed delay (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps an attempt index to the wait before the next attempt.
pub trait Retrier: Send + Sync + fmt::Debug {
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// Never waits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoBackoff;

impl Retrier for NoBackoff {
    fn next_interval(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// Waits the same duration after every failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.min(MAX_BACKOFF),
        }
    }
}

impl Retrier for ConstantBackoff {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Waits `base * (attempt + 1)`, optionally capped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinearBackoff {
    base: Duration,
    max: Option<Duration>,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, max: None }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl Retrier for LinearBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let step = attempt.saturating_add(1).min(u32::MAX as usize) as u32;
        let linear = self.base.checked_mul(step).unwrap_or(MAX_BACKOFF);
        cap(linear, self.max)
    }
}

/// Waits `base * 2^attempt`, optionally capped. The exponent stops growing at 16.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, max: None }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl Retrier for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let exp = attempt.min(16) as u32;
        let multiplier = 1u32 << exp;
        let delay = self.base.checked_mul(multiplier).unwrap_or(MAX_BACKOFF);
        cap(delay, self.max)
    }
}

/// Randomizes another policy's delay within `[delay * (1 - factor), delay]`.
#[derive(Clone, Debug)]
pub struct Jittered<R> {
    inner: R,
    factor: f64,
}

impl<R: Retrier> Jittered<R> {
    /// `factor` is clamped into `[0, 1]`; `1.0` is full jitter, `0.0` disables it.
    pub fn new(inner: R, factor: f64) -> Self {
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { inner, factor }
    }

    pub fn full(inner: R) -> Self {
        Self::new(inner, 1.0)
    }

    pub fn equal(inner: R) -> Self {
        Self::new(inner, 0.5)
    }

    fn apply_with_rng<G: Rng + ?Sized>(&self, delay: Duration, rng: &mut G) -> Duration {
        if self.factor == 0.0 || delay.is_zero() {
            return delay;
        }
        let upper = delay.as_secs_f64();
        let lower = upper * (1.0 - self.factor);
        Duration::from_secs_f64(rng.gen_range(lower..=upper))
    }
}

impl<R: Retrier> Retrier for Jittered<R> {
    fn next_interval(&self, attempt: usize) -> Duration {
        let delay = self.inner.next_interval(attempt);
        self.apply_with_rng(delay, &mut rand::thread_rng())
    }
}

fn cap(delay: Duration, max: Option<Duration>) -> Duration {
    let capped = max.map_or(delay, |m| delay.min(m));
    capped.min(MAX_BACKOFF)
}
