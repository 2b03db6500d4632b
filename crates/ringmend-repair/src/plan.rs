//! What to repair: keyspace, table and endpoint selection.

use std::collections::BTreeSet;

use ringmend_topology::{Cluster, Endpoint};
use tracing::warn;

use crate::error::{RepairError, RepairResult};

/// Operator request for one repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairPlan {
    /// `None` repairs every keyspace in the catalog.
    pub keyspace: Option<String>,
    /// Repair one table only. Disables the per-table fallback.
    pub table: Option<String>,
    /// Allow-list of endpoint addresses; empty admits all.
    pub hosts: Vec<String>,
    /// Endpoint addresses never repaired.
    pub exclude: Vec<String>,
    /// Only repair endpoints in this datacenter.
    pub datacenter: Option<String>,
    /// Scope each repair to the coordinating endpoint's own datacenter.
    pub local: bool,
}

/// A keyspace to repair and the tables its fallback walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceTarget {
    pub name: String,
    /// Sorted.
    pub tables: Vec<String>,
}

/// An endpoint to repair and the datacenter its repairs are scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    pub name: String,
    pub datacenter: Option<String>,
}

impl RepairPlan {
    pub fn for_keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: Some(keyspace.into()),
            ..Self::default()
        }
    }

    /// Keyspaces to process, sorted by name.
    pub fn keyspaces(&self, cluster: &Cluster) -> RepairResult<Vec<KeyspaceTarget>> {
        let target = |name: &str, tables: &BTreeSet<String>| KeyspaceTarget {
            name: name.to_string(),
            tables: tables.iter().cloned().collect(),
        };

        match (&self.keyspace, &self.table) {
            (None, Some(table)) => Err(RepairError::InvalidPlan(format!(
                "table {table} given without a keyspace"
            ))),
            (None, None) => Ok(cluster
                .keyspaces()
                .map(|ks| target(&ks.name, &ks.tables))
                .collect()),
            (Some(name), table) => {
                let keyspace = cluster.keyspace(name)?;
                if let Some(table) = table {
                    if !keyspace.has_table(table) {
                        return Err(RepairError::TableNotFound {
                            keyspace: name.clone(),
                            table: table.clone(),
                        });
                    }
                }
                Ok(vec![target(&keyspace.name, &keyspace.tables)])
            }
        }
    }

    /// Whether the endpoint passes the allow-list, deny-list and dc filters.
    pub fn admits(&self, endpoint: &Endpoint) -> bool {
        if !self.hosts.is_empty() && !self.hosts.contains(&endpoint.name) {
            return false;
        }
        if self.exclude.contains(&endpoint.name) {
            return false;
        }
        match &self.datacenter {
            Some(dc) => endpoint.dc().is_ok_and(|own| own == dc),
            None => true,
        }
    }

    /// Endpoints to process, sorted by address.
    ///
    /// With `local` set every admitted endpoint must report its
    /// datacenter; this is checked here so no repair starts on a plan
    /// that would fail halfway.
    pub fn endpoints(&self, cluster: &Cluster) -> RepairResult<Vec<EndpointTarget>> {
        for host in &self.hosts {
            if cluster.endpoint(host).is_none() {
                warn!(endpoint = %host, "requested host is not a cluster member");
            }
        }

        cluster
            .endpoints()
            .filter(|e| self.admits(e))
            .map(|e| -> RepairResult<EndpointTarget> {
                let datacenter = if self.local {
                    let dc = e.dc().map_err(|_| RepairError::UnknownDatacenter {
                        endpoint: e.name.clone(),
                    })?;
                    Some(dc.to_string())
                } else {
                    None
                };
                Ok(EndpointTarget {
                    name: e.name.clone(),
                    datacenter,
                })
            })
            .collect()
    }
}
