//! Pure reconnection policy
//!
//! Decides whether and when to re-establish a channel after an unplanned
//! close. The schedule is a single bounded exponential backoff:
//! `delay(n) = min(base * growth^n, max_delay)` for attempt `n >= 1`, with an
//! optional cap on consecutive attempts.

use std::time::Duration;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Base interval the growth factor is applied to
    pub base_interval: Duration,
    /// Multiplier per attempt (>= 1.0)
    pub growth_factor: f64,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Consecutive attempts before giving up (None = retry forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(3000),
            growth_factor: 1.5,
            max_delay: Duration::from_millis(30000),
            max_attempts: Some(5),
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay before attempt `attempt` (1-based)
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_interval.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let growth = self.growth_factor.max(1.0);

        // powi saturates to infinity for huge exponents, min() then clamps it
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = (base_ms * growth.powi(exponent)).min(max_ms);

        Duration::from_millis(delay_ms as u64)
    }

    /// Sum of all delays when attempts are capped, None when unbounded
    pub fn calculate_max_total_time(&self) -> Option<Duration> {
        self.max_attempts.map(|max_attempts| {
            (1..=max_attempts)
                .map(|attempt| self.calculate_backoff_delay(attempt))
                .sum()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(max_attempts) = self.max_attempts {
            if max_attempts == 0 {
                return Err("max_attempts must be greater than 0 or None for unlimited".to_string());
            }
        }

        if self.base_interval.is_zero() {
            return Err("base_interval must be greater than 0".to_string());
        }

        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err("growth_factor must be a finite number >= 1.0".to_string());
        }

        if self.max_delay < self.base_interval {
            return Err("max_delay must not be smaller than base_interval".to_string());
        }

        Ok(())
    }
}

/// Stateless reconnection decisions
pub struct ReconnectPolicy;

impl ReconnectPolicy {
    /// Decide what to do after an unplanned close
    ///
    /// `current_attempts` is the number of attempts already scheduled since the
    /// last successful open.
    pub fn decide(
        current_attempts: u32,
        config: &ReconnectConfig,
        permanently_closed: bool,
    ) -> ReconnectionDecision {
        if permanently_closed {
            return ReconnectionDecision::AbortPermanentlyClosed;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded {
                    attempts: current_attempts,
                };
            }
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay: config.calculate_backoff_delay(attempt),
        }
    }

    /// Delay sequence the policy would produce for `closes` consecutive
    /// unplanned closes with no successful open in between
    pub fn schedule(config: &ReconnectConfig, closes: u32) -> Vec<Duration> {
        let mut attempts = 0;
        let mut delays = Vec::new();
        for _ in 0..closes {
            match Self::decide(attempts, config, false) {
                ReconnectionDecision::Proceed { attempt, delay } => {
                    attempts = attempt;
                    delays.push(delay);
                }
                _ => break,
            }
        }
        delays
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    /// Schedule attempt `attempt` after `delay`
    Proceed { attempt: u32, delay: Duration },
    /// The channel was closed permanently
    AbortPermanentlyClosed,
    /// The attempt cap was reached
    AbortMaxAttemptsExceeded { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_interval, Duration::from_millis(3000));
        assert_eq!(config.growth_factor, 1.5);
        assert_eq!(config.max_delay, Duration::from_millis(30000));
        assert_eq!(config.max_attempts, Some(5));
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), Duration::from_millis(4500));
        assert_eq!(config.calculate_backoff_delay(2), Duration::from_millis(6750));
        assert_eq!(config.calculate_backoff_delay(3), Duration::from_millis(10125));
        assert_eq!(config.calculate_backoff_delay(4), Duration::from_millis(15187));
        assert_eq!(config.calculate_backoff_delay(5), Duration::from_millis(22781));

        // Capped from here on
        assert_eq!(config.calculate_backoff_delay(6), Duration::from_millis(30000));
        assert_eq!(config.calculate_backoff_delay(100), Duration::from_millis(30000));
        assert_eq!(config.calculate_backoff_delay(u32::MAX), Duration::from_millis(30000));
    }

    #[test]
    fn test_calculate_max_total_time() {
        let config = ReconnectConfig::default();
        assert_eq!(
            config.calculate_max_total_time(),
            Some(Duration::from_millis(4500 + 6750 + 10125 + 15187 + 22781))
        );

        let unlimited = ReconnectConfig {
            max_attempts: None,
            ..Default::default()
        };
        assert_eq!(unlimited.calculate_max_total_time(), None);
    }

    #[test]
    fn test_decide_proceeds_then_aborts_at_cap() {
        let config = ReconnectConfig::default();

        assert_eq!(
            ReconnectPolicy::decide(0, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay: Duration::from_millis(4500)
            }
        );
        assert_eq!(
            ReconnectPolicy::decide(4, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 5,
                delay: Duration::from_millis(22781)
            }
        );
        assert_eq!(
            ReconnectPolicy::decide(5, &config, false),
            ReconnectionDecision::AbortMaxAttemptsExceeded { attempts: 5 }
        );
    }

    #[test]
    fn test_decide_respects_permanent_close() {
        let config = ReconnectConfig::default();
        assert_eq!(
            ReconnectPolicy::decide(0, &config, true),
            ReconnectionDecision::AbortPermanentlyClosed
        );
    }

    #[test]
    fn test_unbounded_policy_never_gives_up() {
        let config = ReconnectConfig {
            max_attempts: None,
            ..Default::default()
        };
        assert_eq!(
            ReconnectPolicy::decide(10_000, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 10_001,
                delay: Duration::from_millis(30000)
            }
        );
    }

    #[test]
    fn test_sixth_close_schedules_nothing() {
        let delays = ReconnectPolicy::schedule(&ReconnectConfig::default(), 6);
        assert_eq!(delays.len(), 5);
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectConfig::default().validate().is_ok());

        let zero_attempts = ReconnectConfig {
            max_attempts: Some(0),
            ..Default::default()
        };
        assert!(zero_attempts.validate().is_err());

        let shrinking = ReconnectConfig {
            growth_factor: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());

        let nan = ReconnectConfig {
            growth_factor: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let inverted = ReconnectConfig {
            max_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    proptest! {
        #[test]
        fn backoff_schedule_is_non_decreasing_and_bounded(
            base_ms in 1u64..10_000,
            growth in proptest::sample::select(vec![1.0f64, 1.25, 1.5, 2.0, 3.0]),
            extra_ms in 0u64..120_000,
            closes in 1u32..64,
            cap in proptest::option::of(1u32..20),
        ) {
            let config = ReconnectConfig {
                base_interval: Duration::from_millis(base_ms),
                growth_factor: growth,
                max_delay: Duration::from_millis(base_ms + extra_ms),
                max_attempts: cap,
            };

            let delays = ReconnectPolicy::schedule(&config, closes);
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1], "delays must not decrease: {:?}", delays);
            }
            for delay in &delays {
                prop_assert!(*delay <= config.max_delay);
            }
            if let Some(cap) = cap {
                prop_assert!(delays.len() as u32 <= cap);
            }
        }
    }
}
