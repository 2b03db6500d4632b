//! Run-level sequencing: keyspaces, then endpoints, bounded by a worker pool.

use std::sync::Arc;

use ringmend_core::RepairSettings;
use ringmend_gateway::ClusterApi;
use ringmend_topology::{Cluster, Ring};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{RepairError, RepairResult};
use crate::plan::{EndpointTarget, KeyspaceTarget, RepairPlan};
use crate::stop::StopSignal;
use crate::summary::RepairSummary;
use crate::worker::EndpointWorker;

/// Drives one repair run against a cluster.
pub struct Orchestrator {
    api: Arc<dyn ClusterApi>,
    settings: RepairSettings,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn ClusterApi>, settings: RepairSettings) -> Self {
        Self { api, settings }
    }

    /// Load the topology, validate the plan, and repair.
    ///
    /// `shutdown` flipping to `true` stops the run between ranges or
    /// polls with [`RepairError::Cancelled`].
    pub async fn run(
        &self,
        plan: &RepairPlan,
        shutdown: watch::Receiver<bool>,
    ) -> RepairResult<RepairSummary> {
        let cluster = Cluster::load(self.api.as_ref()).await?;
        self.run_on(&cluster, plan, shutdown).await
    }

    /// Repair against an already loaded topology snapshot.
    pub async fn run_on(
        &self,
        cluster: &Cluster,
        plan: &RepairPlan,
        shutdown: watch::Receiver<bool>,
    ) -> RepairResult<RepairSummary> {
        let started = Instant::now();
        let keyspaces = plan.keyspaces(cluster)?;
        let endpoints = plan.endpoints(cluster)?;
        if endpoints.is_empty() {
            warn!("no endpoint matches the requested filters");
        }

        let (abort_tx, abort_rx) = watch::channel(false);
        let stop = StopSignal::new(shutdown, abort_rx);
        let abort = Arc::new(abort_tx);
        let mut summary = RepairSummary::default();

        for keyspace in &keyspaces {
            let result = match stop.check() {
                Ok(()) => {
                    self.repair_keyspace(plan, keyspace, &endpoints, &stop, &abort, &mut summary)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                summary.elapsed = started.elapsed();
                warn!(
                    keyspaces = summary.keyspaces,
                    endpoints = summary.endpoints_repaired,
                    ranges_succeeded = summary.ranges_succeeded,
                    ranges_failed = summary.failed.len(),
                    elapsed = ?summary.elapsed,
                    "repair stopped early"
                );
                return Err(e);
            }
            summary.keyspaces += 1;
        }

        summary.elapsed = started.elapsed();
        info!(
            keyspaces = summary.keyspaces,
            endpoints = summary.endpoints_repaired,
            skipped = summary.skipped.len(),
            ranges_succeeded = summary.ranges_succeeded,
            ranges_failed = summary.failed.len(),
            "repair took {:?}",
            summary.elapsed
        );
        Ok(summary)
    }

    async fn repair_keyspace(
        &self,
        plan: &RepairPlan,
        keyspace: &KeyspaceTarget,
        endpoints: &[EndpointTarget],
        stop: &StopSignal,
        abort: &Arc<watch::Sender<bool>>,
        summary: &mut RepairSummary,
    ) -> RepairResult<()> {
        let ring = Ring::load(self.api.as_ref(), &keyspace.name).await?;
        info!(keyspace = %keyspace.name, endpoints = endpoints.len(), "repairing keyspace");

        let permits = Arc::new(Semaphore::new(self.settings.endpoint_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for target in endpoints {
            let ranges = ring.ranges_for(&target.name).to_vec();
            if ranges.is_empty() {
                debug!(endpoint = %target.name, keyspace = %keyspace.name, "endpoint owns no ranges");
                continue;
            }

            // Acquired in address order so a pool of one stays strictly sequential.
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            if stop.is_set() {
                break;
            }

            let worker = EndpointWorker {
                api: self.api.clone(),
                settings: self.settings.clone(),
                endpoint: target.name.clone(),
                keyspace: keyspace.name.clone(),
                table: plan.table.clone(),
                tables: keyspace.tables.clone(),
                datacenter: target.datacenter.clone(),
                ranges,
                stop: stop.clone(),
            };
            let abort = abort.clone();
            workers.spawn(async move {
                let result = worker.run().await;
                if matches!(result, Err(ref e) if !matches!(e, RepairError::Cancelled)) {
                    abort.send_replace(true);
                }
                drop(permit);
                result
            });
        }

        let mut fatal: Option<RepairError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(RepairError::from).and_then(|r| r);
            match result {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    abort.send_replace(true);
                    // Keep the root cause over the cancellations it triggered.
                    fatal = match fatal {
                        Some(existing) if !matches!(existing, RepairError::Cancelled) => {
                            Some(existing)
                        }
                        _ => Some(e),
                    };
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => stop.check(),
        }
    }
}
