//! Token ownership for one keyspace.

use std::collections::BTreeMap;

use ringmend_core::TokenRange;
use ringmend_gateway::{ClusterApi, RingEntry};
use tracing::debug;

use crate::error::{TopologyError, TopologyResult};

/// Endpoint → token ranges it replicates, for one keyspace.
///
/// Ranges of one endpoint keep the order the ring description listed
/// them in, which is not guaranteed to be sorted or contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    keyspace: String,
    ranges: BTreeMap<String, Vec<TokenRange>>,
}

impl Ring {
    pub async fn load(api: &dyn ClusterApi, keyspace: &str) -> TopologyResult<Self> {
        debug!(%keyspace, "loading ring");
        let entries = api.describe_ring(keyspace).await?;
        Self::from_entries(keyspace, &entries)
    }

    pub fn from_entries(keyspace: &str, entries: &[RingEntry]) -> TopologyResult<Self> {
        let mut ranges: BTreeMap<String, Vec<TokenRange>> = BTreeMap::new();

        for entry in entries {
            if entry.start_token.is_empty() || entry.end_token.is_empty() {
                return Err(TopologyError::InvalidRing {
                    keyspace: keyspace.to_string(),
                    message: format!(
                        "range ({:?}, {:?}) is missing a token",
                        entry.start_token, entry.end_token
                    ),
                });
            }

            let range = entry.range();
            // Older releases only fill `endpoints`.
            let hosts: Vec<&str> = if entry.endpoint_details.is_empty() {
                entry.endpoints.iter().map(String::as_str).collect()
            } else {
                entry.endpoint_details.iter().map(|d| d.host.as_str()).collect()
            };

            for host in hosts {
                let owned = ranges.entry(host.to_string()).or_default();
                if !owned.contains(&range) {
                    owned.push(range.clone());
                }
            }
        }

        debug!(
            %keyspace,
            ranges = entries.len(),
            endpoints = ranges.len(),
            "ring built"
        );

        Ok(Self {
            keyspace: keyspace.to_string(),
            ranges,
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Ranges replicated by `endpoint`; empty if it owns none.
    pub fn ranges_for(&self, endpoint: &str) -> &[TokenRange] {
        self.ranges.get(endpoint).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Endpoints owning at least one range, sorted.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    /// Every distinct range in the ring.
    pub fn all_ranges(&self) -> Vec<TokenRange> {
        let mut all: Vec<TokenRange> = self.ranges.values().flatten().cloned().collect();
        all.sort();
        all.dedup();
        all
    }
}
