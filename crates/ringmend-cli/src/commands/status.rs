use std::fmt::Write;

use ringmend_topology::{Cluster, StatusReport};

use crate::GlobalArgs;
use crate::session::{Session, shutdown_signal};

pub async fn run(global: &GlobalArgs, format: &str) -> anyhow::Result<()> {
    let session = Session::open(global)?;
    let mut shutdown = shutdown_signal();

    let result = tokio::select! {
        result = render(&session, format) => result,
        _ = shutdown.wait_for(|stop| *stop) => Err(anyhow::anyhow!("interrupted")),
    };
    session.close().await;
    result
}

async fn render(session: &Session, format: &str) -> anyhow::Result<()> {
    let api = session.api();
    let cluster = Cluster::load(api.as_ref()).await?;
    let report = cluster.status_report();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print!("{}", format_report(&report)),
    }
    Ok(())
}

const HEADERS: [&str; 6] = ["State", "Address", "Load", "Tokens", "Version", "Rack"];

pub fn format_report(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cluster name: {}", report.cluster);

    for dc in &report.datacenters {
        let _ = writeln!(out, "\nDatacenter: {}", dc.name);
        let rows: Vec<[String; 6]> = dc
            .nodes
            .iter()
            .map(|n| {
                [
                    n.state.clone(),
                    n.address.clone(),
                    n.load.clone(),
                    n.tokens.to_string(),
                    n.version.clone(),
                    n.rack.clone(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        write_row(&mut out, &HEADERS.map(str::to_string), &widths);
        for row in &rows {
            write_row(&mut out, row, &widths);
        }
    }

    if report.healthy {
        out.push_str("\nCluster status: All green!\n");
    } else {
        let _ = writeln!(out, "\nCluster status: Unhealthy\nNodes down ({}):", report.nodes_down());
        for dc in report.datacenters.iter().filter(|dc| !dc.down.is_empty()) {
            let _ = writeln!(out, "{}: {}", dc.name, dc.down.join(", "));
        }
    }
    out
}

fn write_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringmend_topology::{DatacenterStatus, NodeRow};

    fn row(address: &str, alive: bool) -> NodeRow {
        NodeRow {
            state: if alive { "NORMAL" } else { "shutdown" }.to_string(),
            address: address.to_string(),
            is_alive: alive,
            load: "1.5 GB".to_string(),
            tokens: 256,
            version: "3.0.8".to_string(),
            rack: "rack1".to_string(),
        }
    }

    #[test]
    fn healthy_cluster_is_all_green() {
        let report = StatusReport {
            cluster: "Prod".into(),
            datacenters: vec![DatacenterStatus {
                name: "dc1".into(),
                nodes: vec![row("10.0.0.1", true)],
                down: vec![],
            }],
            healthy: true,
        };
        let text = format_report(&report);
        assert!(text.starts_with("Cluster name: Prod\n"));
        assert!(text.contains("\nDatacenter: dc1\n"));
        assert!(text.contains("State   Address   Load    Tokens  Version  Rack\n"));
        assert!(text.contains("NORMAL  10.0.0.1  1.5 GB  256     3.0.8    rack1\n"));
        assert!(text.ends_with("Cluster status: All green!\n"));
    }

    #[test]
    fn unhealthy_cluster_lists_down_nodes() {
        let report = StatusReport {
            cluster: "Prod".into(),
            datacenters: vec![
                DatacenterStatus {
                    name: "dc1".into(),
                    nodes: vec![row("10.0.0.1", true)],
                    down: vec![],
                },
                DatacenterStatus {
                    name: "dc2".into(),
                    nodes: vec![row("10.0.1.1", false), row("10.0.1.2", false)],
                    down: vec!["10.0.1.1".into(), "10.0.1.2".into()],
                },
            ],
            healthy: false,
        };
        let text = format_report(&report);
        assert!(text.contains("Cluster status: Unhealthy\nNodes down (2):\ndc2: 10.0.1.1, 10.0.1.2\n"));
        assert!(!text.contains("dc1: "));
    }
}
