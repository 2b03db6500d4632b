//! Management API resource paths.

pub const CLUSTER_NAME: &str = "/storage_service/cluster_name";
pub const ENDPOINTS_LIVE: &str = "/gossiper/endpoint/live/";
pub const ENDPOINTS_DOWN: &str = "/gossiper/endpoint/down/";
pub const ENDPOINTS_DETAILED: &str = "/failure_detector/endpoints/";
pub const ENDPOINTS_SIMPLE: &str = "/failure_detector/simple_states";
pub const DATACENTER: &str = "/snitch/datacenter";
pub const COLUMN_FAMILY: &str = "/column_family/";
pub const ACTIVE_REPAIR: &str = "/storage_service/active_repair/";

pub fn tokens(endpoint: &str) -> String {
    format!("/storage_service/tokens/{endpoint}")
}

pub fn describe_ring(keyspace: &str) -> String {
    format!("/storage_service/describe_ring/{keyspace}")
}

pub fn repair_async(keyspace: &str) -> String {
    format!("/storage_service/repair_async/{keyspace}")
}
