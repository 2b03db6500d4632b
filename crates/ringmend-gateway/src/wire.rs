//! Wire records returned by the management API.

use ringmend_core::TokenRange;
use serde::{Deserialize, Serialize};

/// One entry of `/failure_detector/endpoints/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    pub addrs: String,
    pub is_alive: bool,
    #[serde(default)]
    pub application_state: Vec<AppStateEntry>,
    #[serde(default)]
    pub update_time: Option<u64>,
    #[serde(default)]
    pub generation: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
}

/// A tagged gossip value. `application_state` is the numeric tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStateEntry {
    pub application_state: i64,
    pub value: String,
}

/// One entry of `/failure_detector/simple_states`: address → `UP`/`DOWN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleState {
    pub key: String,
    pub value: String,
}

/// One token range of `/storage_service/describe_ring/{keyspace}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingEntry {
    pub start_token: String,
    pub end_token: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub endpoint_details: Vec<EndpointDetail>,
}

impl RingEntry {
    pub fn range(&self) -> TokenRange {
        TokenRange::new(self.start_token.clone(), self.end_token.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDetail {
    pub host: String,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
}

/// One entry of `/column_family/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub ks: String,
    pub cf: String,
}

/// Parameters of one asynchronous repair job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairRequest {
    /// Node that coordinates the repair.
    pub endpoint: String,
    pub keyspace: String,
    /// `None` repairs every table of the keyspace.
    pub table: Option<String>,
    pub range: TokenRange,
    /// Restrict repair to replicas in this datacenter.
    pub datacenter: Option<String>,
}
