//! Repair of every range one endpoint owns in one keyspace.

use std::sync::Arc;

use ringmend_core::{Classify, RepairSettings, RepairStatus, TokenRange};
use ringmend_gateway::{ClusterApi, RepairRequest};
use tracing::{debug, error, info, warn};

use crate::budget::FailureBudget;
use crate::error::{RepairError, RepairResult};
use crate::stop::StopSignal;
use crate::summary::{EndpointOutcome, FailedRange, SkippedEndpoint};

/// Result of one range after the direct attempt and any fallback.
enum RangeOutcome {
    Succeeded,
    Failed { tables: Vec<String> },
}

pub(crate) struct EndpointWorker {
    pub(crate) api: Arc<dyn ClusterApi>,
    pub(crate) settings: RepairSettings,
    pub(crate) endpoint: String,
    pub(crate) keyspace: String,
    /// Table requested by the operator, if any.
    pub(crate) table: Option<String>,
    /// Every table of the keyspace, walked by the fallback.
    pub(crate) tables: Vec<String>,
    pub(crate) datacenter: Option<String>,
    pub(crate) ranges: Vec<TokenRange>,
    pub(crate) stop: StopSignal,
}

impl EndpointWorker {
    pub(crate) async fn run(mut self) -> RepairResult<EndpointOutcome> {
        self.stop.check()?;

        match self.api.active_repair(&self.endpoint).await {
            Ok(active) if !active.is_empty() => {
                warn!(
                    endpoint = %self.endpoint,
                    keyspace = %self.keyspace,
                    active = ?active,
                    "endpoint is already involved in a repair, skipping"
                );
                return Ok(self.skipped(format!("active repair {active:?}")));
            }
            Ok(_) => {}
            Err(e) if e.class().is_fatal() => return Err(e.into()),
            Err(e) => {
                error!(
                    endpoint = %self.endpoint,
                    keyspace = %self.keyspace,
                    error = %e,
                    "could not query active repairs, skipping endpoint"
                );
                return Ok(self.skipped(format!("active repair query failed: {e}")));
            }
        }

        info!(
            endpoint = %self.endpoint,
            keyspace = %self.keyspace,
            table = self.table.as_deref().unwrap_or(""),
            ranges = self.ranges.len(),
            "repairing endpoint"
        );

        let mut budget = FailureBudget::new(self.settings.max_failures);
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let ranges = std::mem::take(&mut self.ranges);
        let total = ranges.len();

        for (index, range) in ranges.into_iter().enumerate() {
            self.stop.check()?;

            match self.repair_range(&range).await? {
                RangeOutcome::Succeeded => {
                    succeeded += 1;
                    budget.record_success();
                }
                RangeOutcome::Failed { tables } => {
                    budget.record_failure();
                    failed.push(FailedRange {
                        endpoint: self.endpoint.clone(),
                        keyspace: self.keyspace.clone(),
                        tables,
                        range,
                    });
                }
            }

            info!(endpoint = %self.endpoint, keyspace = %self.keyspace, "{}/{} complete", index + 1, total);

            if budget.exhausted() {
                error!(
                    endpoint = %self.endpoint,
                    keyspace = %self.keyspace,
                    failures = budget.failures(),
                    "failure budget exhausted"
                );
                return Err(RepairError::FailureBudgetExceeded {
                    endpoint: self.endpoint.clone(),
                    keyspace: self.keyspace.clone(),
                    failures: budget.failures(),
                });
            }
        }

        Ok(EndpointOutcome::Repaired { succeeded, failed })
    }

    async fn repair_range(&mut self, range: &TokenRange) -> RepairResult<RangeOutcome> {
        let table = self.table.clone();
        if self.attempt(range, table.as_deref()).await? {
            return Ok(RangeOutcome::Succeeded);
        }

        // A requested table has nothing narrower to fall back to.
        if let Some(table) = table {
            return Ok(RangeOutcome::Failed {
                tables: vec![table],
            });
        }

        info!(
            endpoint = %self.endpoint,
            keyspace = %self.keyspace,
            start_token = %range.start,
            end_token = %range.end,
            cooldown = ?self.settings.fallback_cooldown,
            "range failed, retrying table by table after cooldown"
        );
        self.stop.pause(self.settings.fallback_cooldown).await?;

        let tables = self.tables.clone();
        let mut failed_tables = Vec::new();
        for table in &tables {
            if !self.attempt(range, Some(table)).await? {
                failed_tables.push(table.clone());
            }
        }

        if failed_tables.is_empty() && !tables.is_empty() {
            Ok(RangeOutcome::Succeeded)
        } else {
            Ok(RangeOutcome::Failed {
                tables: failed_tables,
            })
        }
    }

    /// One repair job. `Ok(false)` for a failed job or a non-fatal API error.
    async fn attempt(&mut self, range: &TokenRange, table: Option<&str>) -> RepairResult<bool> {
        self.stop.check()?;

        let request = RepairRequest {
            endpoint: self.endpoint.clone(),
            keyspace: self.keyspace.clone(),
            table: table.map(str::to_string),
            range: range.clone(),
            datacenter: self.datacenter.clone(),
        };

        match self.run_job(&request).await {
            Ok(status) if status.is_success() => Ok(true),
            Ok(status) => {
                error!(
                    endpoint = %self.endpoint,
                    keyspace = %self.keyspace,
                    table = table.unwrap_or(""),
                    start_token = %range.start,
                    end_token = %range.end,
                    %status,
                    "range repair failed"
                );
                Ok(false)
            }
            Err(RepairError::Gateway(e)) if !e.class().is_fatal() => {
                error!(
                    endpoint = %self.endpoint,
                    keyspace = %self.keyspace,
                    table = table.unwrap_or(""),
                    start_token = %range.start,
                    end_token = %range.end,
                    error = %e,
                    "range repair request failed"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Start a job and poll it until it reaches a terminal status.
    async fn run_job(&mut self, request: &RepairRequest) -> RepairResult<RepairStatus> {
        let job_id = self.api.repair_start(request).await?;
        debug!(
            endpoint = %request.endpoint,
            keyspace = %request.keyspace,
            job_id = %job_id,
            range = %request.range,
            "repair job started"
        );

        loop {
            self.stop.pause(self.settings.poll_interval).await?;
            let status = self
                .api
                .repair_status(&request.endpoint, &request.keyspace, &job_id)
                .await?;
            if !status.is_terminal() {
                continue;
            }
            if let RepairStatus::Unknown(raw) = &status {
                warn!(job_id = %job_id, status = %raw, "unknown repair status, treating as failed");
            }
            return Ok(status);
        }
    }

    fn skipped(&self, reason: String) -> EndpointOutcome {
        EndpointOutcome::Skipped(SkippedEndpoint {
            endpoint: self.endpoint.clone(),
            keyspace: self.keyspace.clone(),
            reason,
        })
    }
}
