use std::fmt::Write;
use std::time::Duration;

use ringmend_repair::{Orchestrator, RepairPlan, RepairSummary};
use tracing::warn;

use crate::GlobalArgs;
use crate::session::{Session, shutdown_signal};

pub async fn run(
    global: &GlobalArgs,
    plan: RepairPlan,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let mut session = Session::open(global)?;
    if let Some(concurrency) = concurrency {
        session.settings.repair.endpoint_concurrency = concurrency;
    }
    if let Err(e) = session.settings.validate() {
        session.close().await;
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(session.api(), session.settings.repair.clone());
    let result = orchestrator.run(&plan, shutdown_signal()).await;
    session.close().await;

    let summary = result?;
    print!("{}", format_summary(&summary));
    if !summary.is_clean() {
        warn!(failed = summary.failed.len(), "some ranges could not be repaired");
    }
    Ok(())
}

pub fn format_summary(summary: &RepairSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Repaired {} keyspace(s) on {} endpoint(s) in {}: {} range(s) ok, {} failed, {} endpoint(s) skipped",
        summary.keyspaces,
        summary.endpoints_repaired,
        format_elapsed(summary.elapsed),
        summary.ranges_succeeded,
        summary.failed.len(),
        summary.skipped.len(),
    );
    for skipped in &summary.skipped {
        let _ = writeln!(
            out,
            "  skipped {} ({}): {}",
            skipped.endpoint, skipped.keyspace, skipped.reason
        );
    }
    for failed in &summary.failed {
        let tables = if failed.tables.is_empty() {
            "all tables".to_string()
        } else {
            failed.tables.join(",")
        };
        let _ = writeln!(
            out,
            "  failed {} {} [{}] range {}",
            failed.endpoint, failed.keyspace, tables, failed.range
        );
    }
    out
}

/// `H:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
