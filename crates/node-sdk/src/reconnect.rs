//! Reconnect policy: exponential back-off with random jitter.

use std::time::Duration;

/// Controls how the node client reconnects after losing the hub.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Consecutive failures tolerated before giving up. `0` retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectBackoff {
    /// A policy that never retries; useful for tests and one-shot tools.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (0-indexed), with up to 20% jitter on
    /// top of the capped exponential value.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let raw_ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        let jitter_ms = capped_ms * 0.2 * jitter_fraction();
        Duration::from_millis((capped_ms + jitter_ms) as u64)
    }

    /// Whether `attempt` failures exhaust the policy.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Uniform-ish fraction in `[0, 1)` taken from a v4 UUID's random bits.
fn jitter_fraction() -> f64 {
    let bits = (uuid::Uuid::new_v4().as_u128() & u64::MAX as u128) as u64;
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        let p = ReconnectBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            max_attempts: 0,
        };
        let d0 = p.delay_for_attempt(0);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(120));
        let d3 = p.delay_for_attempt(3);
        assert!(d3 >= Duration::from_millis(800) && d3 <= Duration::from_millis(960));
        let d20 = p.delay_for_attempt(20);
        assert!(d20 >= Duration::from_millis(1_000) && d20 <= Duration::from_millis(1_200));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let p = ReconnectBackoff::default();
        assert!(p.delay_for_attempt(u32::MAX) <= Duration::from_secs(36));
    }

    #[test]
    fn give_up_only_when_limited() {
        let p = ReconnectBackoff {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!p.should_give_up(2));
        assert!(p.should_give_up(3));
        assert!(!ReconnectBackoff::default().should_give_up(1_000_000));
        assert!(ReconnectBackoff::no_retry().should_give_up(1));
    }
}
