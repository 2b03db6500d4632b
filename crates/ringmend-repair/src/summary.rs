//! Outcome of a repair run.

use std::time::Duration;

use ringmend_core::TokenRange;
use serde::Serialize;

/// A range that stayed failed after every attempt, with enough context
/// to repair it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRange {
    pub endpoint: String,
    pub keyspace: String,
    /// Tables whose attempt failed. Empty when the whole keyspace was
    /// attempted and the fallback never ran.
    pub tables: Vec<String>,
    pub range: TokenRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEndpoint {
    pub endpoint: String,
    pub keyspace: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub keyspaces: usize,
    pub endpoints_repaired: usize,
    pub skipped: Vec<SkippedEndpoint>,
    pub ranges_succeeded: usize,
    pub failed: Vec<FailedRange>,
    pub elapsed: Duration,
}

impl RepairSummary {
    /// True when no range failed. Skipped endpoints do not count.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-endpoint result handed back by a worker.
#[derive(Debug)]
pub(crate) enum EndpointOutcome {
    Repaired {
        succeeded: usize,
        failed: Vec<FailedRange>,
    },
    Skipped(SkippedEndpoint),
}

impl RepairSummary {
    pub(crate) fn record(&mut self, outcome: EndpointOutcome) {
        match outcome {
            EndpointOutcome::Repaired { succeeded, failed } => {
                self.endpoints_repaired += 1;
                self.ranges_succeeded += succeeded;
                self.failed.extend(failed);
            }
            EndpointOutcome::Skipped(skipped) => self.skipped.push(skipped),
        }
    }
}
