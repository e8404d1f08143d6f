//! Adaptive polling interval policy.
//!
//! A single per-table interval is mutated by whichever cycle outcome fires:
//! a changed sheet resets it to base, an unchanged sheet grows it gently,
//! and a failed fetch grows it aggressively.

use std::time::Duration;

/// Multiplicative backoff parameters for sheet polling.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Interval after a change (and the starting interval).
    pub base_ms: u64,
    /// Growth factor after an unchanged cycle.
    pub unchanged_factor: f64,
    /// Upper bound reached by unchanged-cycle growth.
    pub unchanged_cap_ms: u64,
    /// Growth factor after a failed cycle.
    pub error_factor: f64,
    /// Upper bound reached by failed-cycle growth.
    pub error_cap_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 5_000,
            unchanged_factor: 1.5,
            unchanged_cap_ms: 60_000,
            error_factor: 2.0,
            error_cap_ms: 120_000,
        }
    }
}

impl BackoffPolicy {
    /// Interval to use after a cycle that applied new rows.
    #[must_use]
    pub fn after_changed(&self) -> u64 {
        self.base_ms
    }

    /// Interval to use after a cycle whose tag matched the stored one.
    ///
    /// An interval already at or above the cap (e.g. inherited from error
    /// backoff) is left untouched.
    #[must_use]
    pub fn after_unchanged(&self, current_ms: u64) -> u64 {
        if current_ms >= self.unchanged_cap_ms {
            return current_ms;
        }
        scale(current_ms, self.unchanged_factor).min(self.unchanged_cap_ms)
    }

    /// Interval to use after a cycle whose fetch failed.
    #[must_use]
    pub fn after_error(&self, current_ms: u64) -> u64 {
        scale(current_ms, self.error_factor).min(self.error_cap_ms)
    }
}

// Intervals are bounded by the caps (a few minutes), far inside f64's exact
// integer range.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scale(ms: u64, factor: f64) -> u64 {
    (ms as f64 * factor) as u64
}

/// Current polling interval of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(u64);

impl PollInterval {
    /// Starts at the policy's base interval.
    #[must_use]
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self(policy.base_ms)
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }

    pub fn reset(&mut self, policy: &BackoffPolicy) {
        self.0 = policy.after_changed();
    }

    pub fn grow_unchanged(&mut self, policy: &BackoffPolicy) {
        self.0 = policy.after_unchanged(self.0);
    }

    pub fn grow_error(&mut self, policy: &BackoffPolicy) {
        self.0 = policy.after_error(self.0);
    }
}
