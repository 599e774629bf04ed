//! Precomputed retry delays.
//!
//! Callers that retry after a node-scoped failure look up how long to wait in
//! a [`DelayTable`]. The table is built once from a generating function and
//! is read-only afterwards, so it can be shared between threads freely.
//!
//! ```rust
//! use std::time::Duration;
//! use respool::{exponential, DelayTable};
//!
//! let table = DelayTable::new(
//!     exponential(Duration::from_millis(100), 2),
//!     Duration::from_millis(2000),
//! );
//! assert_eq!(table.delay(3), Duration::from_millis(800));
//! assert_eq!(table.delay(42), Duration::from_millis(2000));
//! ```

use std::time::Duration;

use rand::Rng;

/// Upper bound on the number of entries a [`DelayTable`] will hold.
///
/// Generators that never reach the ceiling stop being evaluated here.
pub const MAX_DELAY_TABLE_LEN: usize = 4096;

/// Maps a retry index to a wait duration.
///
/// The table holds the prefix of generated values that are strictly below the
/// ceiling. Any retry index past the end of the table waits for the ceiling.
/// The generator is assumed to be non-decreasing: the table ends at the first
/// value that reaches the ceiling, even if later values would drop below it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelayTable {
    delays: Box<[Duration]>,
    ceiling: Duration,
}

impl DelayTable {
    /// Evaluates `f(0), f(1), ...` until a value reaches `ceiling`.
    pub fn new<F>(mut f: F, ceiling: Duration) -> Self
    where
        F: FnMut(u32) -> Duration,
    {
        let mut delays = Vec::new();
        let mut retry = 0u32;
        loop {
            if delays.len() == MAX_DELAY_TABLE_LEN {
                log::warn!(
                    "Delay generator did not reach the ceiling of {ceiling:?} after {MAX_DELAY_TABLE_LEN} retries"
                );
                break;
            }
            let delay = f(retry);
            if delay >= ceiling {
                break;
            }
            delays.push(delay);
            retry += 1;
        }

        DelayTable {
            delays: delays.into_boxed_slice(),
            ceiling,
        }
    }

    /// Returns how long to wait before retry number `retry` (0-based).
    pub fn delay(&self, retry: usize) -> Duration {
        self.delays.get(retry).copied().unwrap_or(self.ceiling)
    }

    /// The wait used for every retry past the end of the table.
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Number of precomputed entries.
    pub fn len(&self) -> usize {
        self.delays.len()
    }

    /// Returns true if even the first generated value reached the ceiling.
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// The precomputed entries, in retry order.
    pub fn as_slice(&self) -> &[Duration] {
        &self.delays
    }
}

/// `base * exponent_base ^ retry`, saturating instead of overflowing.
pub fn exponential(base: Duration, exponent_base: u32) -> impl Fn(u32) -> Duration {
    move |retry| {
        let multiplier = exponent_base.checked_pow(retry).unwrap_or(u32::MAX);
        base.saturating_mul(multiplier)
    }
}

const DEFAULT_MAX_RETRY_WAIT_TIME: u64 = 655360;
const DEFAULT_MIN_RETRY_WAIT_TIME: u64 = 1280;
const DEFAULT_RETRY_EXPONENT_BASE: u64 = 2;
const DEFAULT_RETRY_FACTOR: u64 = 10;

/// Exponential backoff with optional jitter, in milliseconds.
///
/// The wait for `retry` is `factor * exponent_base ^ retry`, clamped to
/// `[min_wait, max_wait]`. With jitter enabled, a value is drawn uniformly
/// from `min_wait` up to that clamped wait.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    exponent_base: u64,
    factor: u64,
    min_wait: u64,
    max_wait: u64,
    jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            exponent_base: DEFAULT_RETRY_EXPONENT_BASE,
            factor: DEFAULT_RETRY_FACTOR,
            min_wait: DEFAULT_MIN_RETRY_WAIT_TIME,
            max_wait: DEFAULT_MAX_RETRY_WAIT_TIME,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Sets the exponent base.
    pub fn exponent_base(mut self, exponent_base: u64) -> Self {
        self.exponent_base = exponent_base;
        self
    }

    /// Sets the factor, in milliseconds.
    pub fn factor(mut self, factor: u64) -> Self {
        self.factor = factor;
        self
    }

    /// Sets the lower bound of a single wait, in milliseconds.
    pub fn min_wait(mut self, min_wait: u64) -> Self {
        self.min_wait = min_wait;
        self
    }

    /// Sets the upper bound of a single wait, in milliseconds.
    pub fn max_wait(mut self, max_wait: u64) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Enables or disables jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the wait before retry number `retry`.
    pub fn wait_time_for_retry(&self, retry: u32) -> Duration {
        let base_wait = self
            .exponent_base
            .checked_pow(retry)
            .and_then(|pow| pow.checked_mul(self.factor))
            .unwrap_or(u64::MAX);
        let max_wait = self.max_wait.max(self.min_wait);
        if !self.jitter {
            return Duration::from_millis(base_wait.clamp(self.min_wait, max_wait));
        }
        let clamped_wait = base_wait
            .min(max_wait.saturating_add(1))
            .max(self.min_wait.saturating_add(1));
        let jittered_wait = rand::rng().random_range(self.min_wait..clamped_wait);
        Duration::from_millis(jittered_wait)
    }

    /// Precomputes the waits below `ceiling`.
    ///
    /// With jitter enabled the generated sequence is not monotonic, so the
    /// table may end early; the ceiling still bounds every lookup.
    pub fn table(&self, ceiling: Duration) -> DelayTable {
        DelayTable::new(|retry| self.wait_time_for_retry(retry), ceiling)
    }
}
