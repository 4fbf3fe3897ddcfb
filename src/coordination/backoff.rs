use std::time::Duration;

/// Exponential backoff policy: `min(max_delay, base_delay * 2^failure_count)`.
///
/// Pure and deterministic. The multiplier saturates before the shift can
/// overflow, so arbitrarily large failure counts clamp to `max_delay`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay to wait after `failure_count` consecutive failures
    pub fn next_delay(&self, failure_count: u32) -> Duration {
        let factor = 1u32.checked_shl(failure_count).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .clamp(self.base_delay, self.max_delay)
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_from_base() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(300));
        assert_eq!(policy.next_delay(0), Duration::from_secs(5));
        assert_eq!(policy.next_delay(1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(2), Duration::from_secs(20));
        assert_eq!(policy.next_delay(5), Duration::from_secs(160));
    }

    #[test]
    fn test_clamped_to_ceiling() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(300));
        assert_eq!(policy.next_delay(6), Duration::from_secs(300));
        assert_eq!(policy.next_delay(31), Duration::from_secs(300));
        // Shift counts past the u32 width must not overflow
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_non_decreasing() {
        let policy = BackoffPolicy::default();
        let mut last = Duration::ZERO;
        for n in 0..64 {
            let delay = policy.next_delay(n);
            assert!(delay >= last, "delay regressed at n={n}");
            assert!(delay <= policy.max_delay());
            last = delay;
        }
    }

    #[test]
    fn test_ceiling_below_base_is_lifted() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(policy.next_delay(0), Duration::from_secs(10));
        assert_eq!(policy.next_delay(9), Duration::from_secs(10));
    }
}
