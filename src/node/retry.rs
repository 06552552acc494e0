//! Retry policy for rendezvous attempts
//!
//! A node keeps polling its coordinator until the group is complete. The
//! policy decides how long to sleep between attempts and when to give up,
//! either after a number of attempts or once an overall deadline passes.

use rand::Rng;
use std::time::{Duration, Instant};

use crate::common::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before giving up; `None` retries until the deadline
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 1.0 keeps the delay fixed
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
    /// Overall budget measured from the first attempt
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RetryPolicy {
    /// Constant delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: false,
            deadline: None,
        }
    }

    /// Delay doubling from `initial_delay` up to `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: true,
            deadline: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: None,
            initial_delay: config.poll_delay(),
            max_delay: config.max_poll_delay(),
            multiplier: 2.0,
            jitter: true,
            deadline: Some(config.join_timeout()),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped
        };

        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Whether attempt number `attempt` (1-based) may start
    pub fn allows_attempt(&self, attempt: u32, started: Instant) -> bool {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return false;
            }
        }
        match self.deadline {
            Some(deadline) => attempt == 1 || started.elapsed() < deadline,
            None => true,
        }
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self, started: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_sub(started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy =
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(8)).without_jitter();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(50), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..100 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(2));
        for _ in 0..100 {
            assert!(policy.delay_for_attempt(10) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_max_attempts() {
        let policy = RetryPolicy::fixed(Duration::ZERO).with_max_attempts(3);
        let started = Instant::now();
        assert!(policy.allows_attempt(1, started));
        assert!(policy.allows_attempt(3, started));
        assert!(!policy.allows_attempt(4, started));
    }

    #[test]
    fn test_deadline() {
        let policy = RetryPolicy::fixed(Duration::ZERO).with_deadline(Duration::ZERO);
        let started = Instant::now();
        // first attempt always runs
        assert!(policy.allows_attempt(1, started));
        assert!(!policy.allows_attempt(2, started));
        assert_eq!(policy.remaining(started), Some(Duration::ZERO));
        assert_eq!(policy.without_deadline().remaining(started), None);
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&Config::default());
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.deadline, Some(Duration::from_secs(300)));
        assert_eq!(policy.max_attempts, None);
    }
}
