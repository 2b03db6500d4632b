//! ringmend-gateway: typed facade over the management API.
//!
//! Each operation maps to one fixed resource path. The gateway adds no
//! fault handling of its own: retries and tunnel recovery happen in
//! [`ringmend_channel::Channel`], and whatever error survives is
//! returned unchanged.
//!
//! [`ClusterApi`] is the seam the topology model and the orchestrator
//! program against; [`Gateway`] is the channel-backed implementation.

pub mod api;
pub mod error;
pub mod gateway;
pub mod paths;
pub mod wire;

pub use api::{ApiFuture, ClusterApi};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use wire::{AppStateEntry, EndpointDetail, EndpointState, RepairRequest, RingEntry, SimpleState, TableEntry};
