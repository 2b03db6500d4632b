use ringmend_core::{Classify, ErrorClass};
use ringmend_gateway::GatewayError;
use thiserror::Error;

pub type TopologyResult<T> = Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("endpoint {endpoint}: field `{field}` not present in application state")]
    FieldNotPresent {
        endpoint: String,
        field: &'static str,
    },

    #[error("endpoint {endpoint}: invalid `{field}` value {value:?}")]
    InvalidField {
        endpoint: String,
        field: &'static str,
        value: String,
    },

    #[error("ring of keyspace {keyspace}: {message}")]
    InvalidRing { keyspace: String, message: String },

    #[error("keyspace not found: {0}")]
    KeyspaceNotFound(String),
}

impl Classify for TopologyError {
    fn class(&self) -> ErrorClass {
        match self {
            TopologyError::Gateway(e) => e.class(),
            TopologyError::FieldNotPresent { .. }
            | TopologyError::InvalidField { .. }
            | TopologyError::InvalidRing { .. } => ErrorClass::Protocol,
            TopologyError::KeyspaceNotFound(_) => ErrorClass::Configuration,
        }
    }
}
