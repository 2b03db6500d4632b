use ringmend_core::{Classify, ErrorClass};
use ringmend_gateway::GatewayError;
use ringmend_topology::TopologyError;
use thiserror::Error;

pub type RepairResult<T> = Result<T, RepairError>;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid repair plan: {0}")]
    InvalidPlan(String),

    #[error("table {table} not found in keyspace {keyspace}")]
    TableNotFound { keyspace: String, table: String },

    #[error("endpoint {endpoint} reports no datacenter; cannot scope repair to the local datacenter")]
    UnknownDatacenter { endpoint: String },

    #[error("{failures} consecutive failed ranges on {endpoint} (keyspace {keyspace}); aborting repair")]
    FailureBudgetExceeded {
        endpoint: String,
        keyspace: String,
        failures: u32,
    },

    #[error("repair cancelled")]
    Cancelled,

    #[error("repair worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl Classify for RepairError {
    fn class(&self) -> ErrorClass {
        match self {
            RepairError::Topology(e) => e.class(),
            RepairError::Gateway(e) => e.class(),
            RepairError::InvalidPlan(_)
            | RepairError::TableNotFound { .. }
            | RepairError::UnknownDatacenter { .. } => ErrorClass::Configuration,
            RepairError::FailureBudgetExceeded { .. }
            | RepairError::Cancelled
            | RepairError::Worker(_) => ErrorClass::Policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let budget = RepairError::FailureBudgetExceeded {
            endpoint: "10.0.0.1".into(),
            keyspace: "ks".into(),
            failures: 20,
        };
        assert_eq!(budget.class(), ErrorClass::Policy);
        assert!(budget.to_string().contains("20 consecutive"));

        let missing = RepairError::from(TopologyError::KeyspaceNotFound("ks".into()));
        assert_eq!(missing.class(), ErrorClass::Configuration);

        let payload = RepairError::from(GatewayError::Payload {
            operation: "repair_start",
            message: "empty job id".into(),
        });
        assert_eq!(payload.class(), ErrorClass::Protocol);
    }
}
