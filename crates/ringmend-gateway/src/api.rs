use std::future::Future;
use std::pin::Pin;

use ringmend_core::RepairStatus;

use crate::error::GatewayResult;
use crate::wire::{EndpointState, RepairRequest, RingEntry, SimpleState, TableEntry};

/// Boxed future returned by every [`ClusterApi`] operation.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Typed management API operations.
///
/// Calls without an endpoint argument go to the entry endpoint.
pub trait ClusterApi: Send + Sync {
    fn cluster_name(&self) -> ApiFuture<'_, String>;

    fn endpoints_live(&self) -> ApiFuture<'_, Vec<String>>;

    fn endpoints_down(&self) -> ApiFuture<'_, Vec<String>>;

    /// Full gossip state of every endpoint. Refreshes the set of
    /// endpoints later calls may target.
    fn endpoints_detailed(&self) -> ApiFuture<'_, Vec<EndpointState>>;

    /// `UP`/`DOWN` per endpoint. Refreshes the set of targetable endpoints.
    fn endpoints_simple(&self) -> ApiFuture<'_, Vec<SimpleState>>;

    fn tokens<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, Vec<String>>;

    fn datacenter<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, String>;

    fn describe_ring<'a>(&'a self, keyspace: &'a str) -> ApiFuture<'a, Vec<RingEntry>>;

    fn tables(&self) -> ApiFuture<'_, Vec<TableEntry>>;

    /// Start an asynchronous repair on `request.endpoint`; returns the job id.
    fn repair_start<'a>(&'a self, request: &'a RepairRequest) -> ApiFuture<'a, String>;

    fn repair_status<'a>(
        &'a self,
        endpoint: &'a str,
        keyspace: &'a str,
        job_id: &'a str,
    ) -> ApiFuture<'a, RepairStatus>;

    /// Ids of repair jobs currently running on `endpoint`.
    fn active_repair<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, Vec<String>>;
}
