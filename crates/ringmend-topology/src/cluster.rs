//! Cluster snapshot: endpoints and keyspaces.

use std::collections::{BTreeMap, BTreeSet};

use ringmend_gateway::{ClusterApi, EndpointState, TableEntry};
use tracing::{debug, info};

use crate::appstate::ApplicationState;
use crate::error::{TopologyError, TopologyResult};
use crate::report::StatusReport;

/// Datacenter label used when a node does not report one.
pub const UNKNOWN_DC: &str = "<unknown>";

/// A cluster member, identified by its address.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub name: String,
    pub is_alive: bool,
    pub state: ApplicationState,
}

impl Endpoint {
    pub fn from_state(state: &EndpointState) -> TopologyResult<Self> {
        Ok(Self {
            name: state.addrs.clone(),
            is_alive: state.is_alive,
            state: ApplicationState::parse(&state.addrs, &state.application_state)?,
        })
    }

    pub fn status(&self) -> &str {
        &self.state.status
    }

    pub fn load(&self) -> u64 {
        self.state.load
    }

    pub fn tokens(&self) -> &[String] {
        &self.state.tokens
    }

    /// Datacenter of the node, or `FieldNotPresent` if it never reported one.
    pub fn dc(&self) -> TopologyResult<&str> {
        self.state
            .dc
            .as_deref()
            .ok_or_else(|| TopologyError::FieldNotPresent {
                endpoint: self.name.clone(),
                field: "dc",
            })
    }

    pub fn rack(&self) -> Option<&str> {
        self.state.rack.as_deref()
    }

    pub fn release_version(&self) -> Option<&str> {
        self.state.release_version.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    pub name: String,
    pub tables: BTreeSet<String>,
}

impl Keyspace {
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }
}

/// Read-only view of the cluster for the duration of one run.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    endpoints: BTreeMap<String, Endpoint>,
    keyspaces: BTreeMap<String, Keyspace>,
}

impl Cluster {
    /// Fetch name, endpoint states and the table catalog.
    ///
    /// Any failing call fails the load; a partial topology is never returned.
    pub async fn load(api: &dyn ClusterApi) -> TopologyResult<Self> {
        let name = api.cluster_name().await?;
        let states = api.endpoints_detailed().await?;
        let tables = api.tables().await?;
        let cluster = Self::from_parts(name, &states, &tables)?;
        info!(
            cluster = %cluster.name,
            endpoints = cluster.endpoints.len(),
            keyspaces = cluster.keyspaces.len(),
            "cluster topology loaded"
        );
        Ok(cluster)
    }

    pub fn from_parts(
        name: String,
        states: &[EndpointState],
        tables: &[TableEntry],
    ) -> TopologyResult<Self> {
        let mut endpoints = BTreeMap::new();
        for state in states {
            let endpoint = Endpoint::from_state(state)?;
            endpoints.insert(endpoint.name.clone(), endpoint);
        }

        let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in tables {
            grouped.entry(entry.ks.clone()).or_default().insert(entry.cf.clone());
        }
        let keyspaces = grouped
            .into_iter()
            .map(|(name, tables)| {
                debug!(keyspace = %name, tables = tables.len(), "keyspace discovered");
                (name.clone(), Keyspace { name, tables })
            })
            .collect();

        Ok(Self {
            name,
            endpoints,
            keyspaces,
        })
    }

    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Endpoints sorted by address.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn keyspace(&self, name: &str) -> TopologyResult<&Keyspace> {
        self.keyspaces
            .get(name)
            .ok_or_else(|| TopologyError::KeyspaceNotFound(name.to_string()))
    }

    /// Keyspaces sorted by name.
    pub fn keyspaces(&self) -> impl Iterator<Item = &Keyspace> {
        self.keyspaces.values()
    }

    /// Endpoints grouped by datacenter, for presentation only.
    pub fn endpoints_by_datacenter(&self) -> BTreeMap<String, Vec<&Endpoint>> {
        let mut grouped: BTreeMap<String, Vec<&Endpoint>> = BTreeMap::new();
        for endpoint in self.endpoints.values() {
            let dc = endpoint.state.dc.as_deref().unwrap_or(UNKNOWN_DC);
            grouped.entry(dc.to_string()).or_default().push(endpoint);
        }
        grouped
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::build(self)
    }
}
