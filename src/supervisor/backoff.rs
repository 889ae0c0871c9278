//! Reconnect policy — linear backoff with a hard attempt ceiling.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay unit; the k-th retry waits `base_delay * k`.
    pub base_delay: Duration,
    /// Retries allowed since the last successful open.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(2000), max_attempts: 5 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|k| policy.delay_for(k).as_millis() as u64).collect();
        assert_eq!(delays, vec![2000, 4000, 6000, 8000, 10000]);
    }

    #[test]
    fn exhausted_at_ceiling() {
        let policy = RetryPolicy { base_delay: Duration::from_millis(10), max_attempts: 3 };
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn zero_attempts_never_retries() {
        let policy = RetryPolicy { base_delay: Duration::from_millis(10), max_attempts: 0 };
        assert!(policy.is_exhausted(0));
    }
}
