//! Operator-facing status summary.

use serde::Serialize;

use crate::cluster::Cluster;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub state: String,
    pub address: String,
    pub is_alive: bool,
    pub load: String,
    pub tokens: usize,
    pub version: String,
    pub rack: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatacenterStatus {
    pub name: String,
    /// Rows sorted by address.
    pub nodes: Vec<NodeRow>,
    pub down: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub cluster: String,
    pub datacenters: Vec<DatacenterStatus>,
    pub healthy: bool,
}

impl StatusReport {
    pub fn build(cluster: &Cluster) -> Self {
        let datacenters: Vec<DatacenterStatus> = cluster
            .endpoints_by_datacenter()
            .into_iter()
            .map(|(name, endpoints)| {
                let mut nodes: Vec<NodeRow> = endpoints
                    .iter()
                    .map(|e| NodeRow {
                        state: e.status().to_string(),
                        address: e.name.clone(),
                        is_alive: e.is_alive,
                        load: human_size(e.load()),
                        tokens: e.tokens().len(),
                        version: e.release_version().unwrap_or("-").to_string(),
                        rack: e.rack().unwrap_or("-").to_string(),
                    })
                    .collect();
                nodes.sort_by(|a, b| a.address.cmp(&b.address));
                let down = nodes
                    .iter()
                    .filter(|n| !n.is_alive)
                    .map(|n| n.address.clone())
                    .collect();
                DatacenterStatus { name, nodes, down }
            })
            .collect();

        let healthy = datacenters.iter().all(|dc| dc.down.is_empty());
        Self {
            cluster: cluster.name.clone(),
            datacenters,
            healthy,
        }
    }

    pub fn nodes_down(&self) -> usize {
        self.datacenters.iter().map(|dc| dc.down.len()).sum()
    }
}

/// Format a byte count with binary units, e.g. `1.43 GB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
