//! Repair job status vocabulary.

use std::fmt;

/// Status of an asynchronous repair job as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStatus {
    Running,
    Successful,
    Failed,
    /// Anything outside the known vocabulary. Callers treat it as failure.
    Unknown(String),
}

impl RepairStatus {
    /// Parse the plain-text body of a status response.
    ///
    /// The management API answers with a JSON-quoted string such as
    /// `"RUNNING"`; quotes and surrounding whitespace are stripped.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_matches('"');
        match trimmed {
            "RUNNING" => RepairStatus::Running,
            "SUCCESSFUL" => RepairStatus::Successful,
            "FAILED" => RepairStatus::Failed,
            other => RepairStatus::Unknown(other.to_string()),
        }
    }

    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RepairStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RepairStatus::Successful)
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairStatus::Running => f.write_str("RUNNING"),
            RepairStatus::Successful => f.write_str("SUCCESSFUL"),
            RepairStatus::Failed => f.write_str("FAILED"),
            RepairStatus::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}
