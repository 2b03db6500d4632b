//! Per-endpoint circuit breaker.

/// Counts consecutive ultimately-failed ranges on one endpoint.
///
/// A range counts once, however many table attempts its fallback made.
/// The count resets when a range succeeds; a fresh budget is used for
/// every endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureBudget {
    failures: u32,
    ceiling: u32,
}

impl FailureBudget {
    pub fn new(ceiling: u32) -> Self {
        Self {
            failures: 0,
            ceiling,
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The run must abort once this is true.
    pub fn exhausted(&self) -> bool {
        self.failures >= self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_ceiling() {
        let mut budget = FailureBudget::new(3);
        budget.record_failure();
        budget.record_failure();
        assert!(!budget.exhausted());
        budget.record_failure();
        assert!(budget.exhausted());
        assert_eq!(budget.failures(), 3);
    }

    #[test]
    fn success_resets() {
        let mut budget = FailureBudget::new(2);
        budget.record_failure();
        budget.record_success();
        budget.record_failure();
        assert!(!budget.exhausted());
        assert_eq!(budget.failures(), 1);
    }
}
