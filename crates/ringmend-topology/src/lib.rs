//! ringmend-topology: the cluster as the repair run sees it.
//!
//! - **`appstate`**: gossip application state, decoded through a closed tag set
//! - **`cluster`**: `Endpoint`, `Keyspace`, and the `Cluster` snapshot
//! - **`ring`**: endpoint → owned token ranges for one keyspace
//! - **`report`**: per-datacenter status summary for operators
//!
//! A `Cluster` is loaded once per run and never updated in place;
//! topology changes during a run are not tracked.

pub mod appstate;
pub mod cluster;
pub mod error;
pub mod report;
pub mod ring;

pub use appstate::{AppStateTag, ApplicationState};
pub use cluster::{Cluster, Endpoint, Keyspace};
pub use error::{TopologyError, TopologyResult};
pub use report::{DatacenterStatus, NodeRow, StatusReport, human_size};
pub use ring::Ring;
