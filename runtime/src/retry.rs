//! Retry logic with exponential backoff for the Outbox Dispatcher
//! (`spec.md` §4.4: "retries use exponential backoff").
//!
//! This is deliberately separate from the Booking Coordinator's own
//! transaction-retry loop (`reservation_postgres::coordinator`), which reacts
//! to serialization failures and deadlocks inside a single database
//! transaction. This module governs retries of an outbox event's *delivery*,
//! which may span many dispatcher polling cycles and is persisted as
//! `outbox_events.next_attempt_at` between attempts.

use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 5 (`spec.md` §4.4 `DEFAULT_MAX_ATTEMPTS`)
/// - `initial_delay`: 1 second
/// - `max_delay`: 30 seconds (`spec.md` §4.4: `min(30s, base * 2^(attempts-1)) + jitter`)
/// - `multiplier`: 2.0 (delay doubles each attempt)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts before an event is dead-lettered.
    pub max_attempts: i32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the exponential backoff delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay on each subsequent attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: reservation_core::outbox::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Calculate the backoff delay before attempt number `attempt` (0-indexed,
    /// counting attempts already made), with jitter to avoid a thundering herd
    /// of dispatcher workers retrying the same event class in lockstep.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        use rand::Rng;

        let base_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.max(0));
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped_secs * jitter)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<i32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set the maximum number of attempts before dead-lettering.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the initial delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`], falling back to defaults for unset fields.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(default.max_attempts),
            initial_delay: self.initial_delay.unwrap_or(default.initial_delay),
            max_delay: self.max_delay.unwrap_or(default.max_delay),
            multiplier: self.multiplier.unwrap_or(default.multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_each_attempt_before_jitter_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .build();

        // jitter is 0.5..=1.0, so the delay is always <= the unjittered value
        // and >= half of it.
        for attempt in 0..4 {
            let unjittered = 0.1 * 2f64.powi(attempt);
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay.as_secs_f64() <= unjittered + f64::EPSILON);
            assert!(delay.as_secs_f64() >= unjittered * 0.5 - f64::EPSILON);
        }
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .build();

        assert!(policy.delay_for_attempt(5) <= Duration::from_secs(2));
    }

    #[test]
    fn default_max_attempts_matches_core_constant() {
        assert_eq!(
            RetryPolicy::default().max_attempts,
            reservation_core::outbox::DEFAULT_MAX_ATTEMPTS
        );
    }

    #[test]
    fn default_max_delay_is_thirty_seconds() {
        assert_eq!(RetryPolicy::default().max_delay, Duration::from_secs(30));
    }
}
