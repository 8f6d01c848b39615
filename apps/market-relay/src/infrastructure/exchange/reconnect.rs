//! Reconnection Policy
//!
//! Computes the pause before an exchange connector redials. Reconnection is
//! unconditional: the policy only shapes the delay and never gives up.
//!
//! The default is an immediate redial. A non-zero initial delay with a
//! multiplier above 1.0 gives capped exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection delays.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first redial after a failure.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each consecutive failure.
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::immediate()
    }
}

impl ReconnectConfig {
    /// Redial without pausing.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Redial after the same pause every time.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Exponential backoff between `initial_delay` and `max_delay`.
    #[must_use]
    pub const fn backoff(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: 0.1,
        }
    }
}

/// Tracks consecutive failures and yields redial delays.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next redial. Always yields a value.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        delay
    }

    /// Forget past failures after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_immediate_and_unbounded() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        for _ in 0..1000 {
            assert_eq!(policy.next_delay(), Duration::ZERO);
        }
        assert_eq!(policy.attempt_count(), 1000);
    }

    #[test]
    fn fixed_delay_does_not_grow() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(250)));

        assert_eq!(policy.next_delay(), Duration::from_millis(250));
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig {
            jitter_factor: 0.0,
            ..ReconnectConfig::backoff(Duration::from_millis(100), Duration::from_millis(300), 2.0)
        };
        let mut policy = ReconnectPolicy::new(config);

        assert_eq!(policy.next_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
        assert_eq!(policy.next_delay(), Duration::from_millis(300));
        assert_eq!(policy.next_delay(), Duration::from_millis(300));
    }

    #[test]
    fn reset_restores_initial_delay() {
        let config = ReconnectConfig {
            jitter_factor: 0.0,
            ..ReconnectConfig::backoff(Duration::from_millis(100), Duration::from_secs(10), 2.0)
        };
        let mut policy = ReconnectPolicy::new(config);
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig::backoff(
                Duration::from_millis(1000),
                Duration::from_secs(10),
                2.0,
            ));

            let millis = policy.next_delay().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of range");
        }
    }
}
