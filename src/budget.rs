//! Token budget accounting for a single composition pass.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Remaining token allowance for one composed request.
///
/// A budget is created fresh per composition and discarded with it. Mandatory
/// reservations go through [`Budget::reserve`] and abort composition when they
/// cannot be satisfied; optional insertions use [`Budget::try_reserve`] and
/// are simply skipped on failure. The balance never goes negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Budget {
    capacity: u64,
    remaining: u64,
}

impl Budget {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            remaining: capacity,
        }
    }

    /// Budget for the no-token-counter path, where every cost is zero.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[inline]
    pub fn can_afford(&self, cost: u64) -> bool {
        cost <= self.remaining
    }

    pub fn can_afford_all(&self, costs: impl IntoIterator<Item = u64>) -> bool {
        let total = costs
            .into_iter()
            .fold(0u64, |acc, cost| acc.saturating_add(cost));
        self.can_afford(total)
    }

    /// Mandatory reservation. Fails with [`Error::BudgetExceeded`] when the
    /// cost does not fit; the caller is expected to abort composition.
    pub fn reserve(&mut self, cost: u64, label: &'static str) -> Result<()> {
        if !self.can_afford(cost) {
            return Err(Error::BudgetExceeded {
                label,
                needed: cost,
                remaining: self.remaining,
            });
        }
        self.remaining -= cost;
        Ok(())
    }

    /// Optional reservation. Returns whether the cost was taken.
    pub fn try_reserve(&mut self, cost: u64) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.remaining -= cost;
        true
    }

    /// Returns previously reserved capacity. Never raises the balance above
    /// the original capacity.
    pub fn free(&mut self, cost: u64) {
        self.remaining = self.remaining.saturating_add(cost).min(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_free() {
        let mut budget = Budget::new(100);
        budget.reserve(40, "fixed").unwrap();
        assert_eq!(budget.remaining(), 60);

        budget.free(15);
        assert_eq!(budget.remaining(), 75);
    }

    #[test]
    fn test_mandatory_reserve_fails() {
        let mut budget = Budget::new(10);
        let err = budget.reserve(11, "fixed").unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded { needed: 11, .. }));
        // A failed reservation leaves the balance untouched.
        assert_eq!(budget.remaining(), 10);
    }

    #[test]
    fn test_try_reserve() {
        let mut budget = Budget::new(10);
        assert!(budget.try_reserve(10));
        assert!(!budget.try_reserve(1));
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_can_afford_all() {
        let budget = Budget::new(10);
        assert!(budget.can_afford_all([3, 3, 4]));
        assert!(!budget.can_afford_all([3, 3, 5]));
        assert!(budget.can_afford_all([]));
    }

    #[test]
    fn test_free_caps_at_capacity() {
        let mut budget = Budget::new(10);
        budget.free(1000);
        assert_eq!(budget.remaining(), 10);
    }

    #[test]
    fn test_unlimited() {
        let mut budget = Budget::unlimited();
        budget.reserve(1_000_000, "fixed").unwrap();
        assert!(budget.can_afford(u64::MAX / 2));
    }
}
