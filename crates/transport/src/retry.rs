//! Remaining-retries policy for queued messages (§6): the retry budget is
//! assigned once, at queue time, from the message's `Reliability`, and is
//! decremented on every failed delivery attempt rather than recomputed from
//! a backoff schedule.

use std::time::Duration;

use edgepolicy_device_core::Reliability;

/// Minimum NO_GUARANTEE budget (`base` in §6); BEST_EFFORT gets `2 * BASE_RETRIES`,
/// GUARANTEED_DELIVERY is treated as unbounded.
pub const BASE_RETRIES: u32 = 3;

/// Large enough that GUARANTEED_DELIVERY messages are never observed to run
/// out in practice, while still letting the dispatch loop terminate instead
/// of spinning forever on a permanently unreachable server.
const UNBOUNDED_RETRIES: u32 = u32::MAX;

/// Remaining-attempts budget for one queued message, per §6: it is consumed
/// by repeated calls to `consume()`, never recomputed from scratch.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    reliability: Reliability,
    remaining: u32,
    attempts: u32,
}

impl RetryBudget {
    pub fn for_reliability(reliability: Reliability) -> Self {
        let remaining = match reliability {
            Reliability::NoGuarantee => BASE_RETRIES,
            Reliability::BestEffort => 2 * BASE_RETRIES,
            Reliability::GuaranteedDelivery => UNBOUNDED_RETRIES,
        };
        Self { reliability, remaining, attempts: 0 }
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records one failed attempt. Returns `true` if a retry should be
    /// attempted, `false` once the budget is exhausted.
    pub fn consume(&mut self) -> bool {
        self.attempts += 1;
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining > 0 || matches!(self.reliability, Reliability::GuaranteedDelivery)
    }

    /// Exponential backoff with a 30s ceiling, independent of the retry
    /// budget itself; only how long to wait between attempts, not whether
    /// another one is owed.
    pub fn backoff_for_attempt(attempt: u32) -> Duration {
        let capped_attempt = attempt.min(8);
        let millis = 200u64.saturating_mul(1u64 << capped_attempt);
        Duration::from_millis(millis.min(30_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_guarantee_gets_base_retries() {
        let mut budget = RetryBudget::for_reliability(Reliability::NoGuarantee);
        for _ in 0..BASE_RETRIES - 1 {
            assert!(budget.consume());
        }
        assert!(!budget.consume());
    }

    #[test]
    fn best_effort_gets_double_base() {
        let mut budget = RetryBudget::for_reliability(Reliability::BestEffort);
        for _ in 0..2 * BASE_RETRIES - 1 {
            assert!(budget.consume());
        }
        assert!(!budget.consume());
    }

    #[test]
    fn guaranteed_delivery_never_exhausts() {
        let mut budget = RetryBudget::for_reliability(Reliability::GuaranteedDelivery);
        for _ in 0..10_000 {
            assert!(budget.consume());
        }
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(RetryBudget::backoff_for_attempt(0), Duration::from_millis(200));
        assert_eq!(RetryBudget::backoff_for_attempt(20), Duration::from_millis(30_000));
    }
}
