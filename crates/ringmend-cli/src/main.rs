//! ringmend: drive anti-entropy repair across a ring-partitioned cluster.
//!
//! # Usage
//!
//! ```text
//! ringmend -H 10.0.0.1 status
//! ringmend -H 10.0.0.1 repair shop orders --dc dc1 --local
//! ringmend -H 10.0.0.1 --direct --port 10000 repair
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod session;

#[derive(Parser)]
#[command(
    name = "ringmend",
    about = "Anti-entropy repair orchestrator for ring-partitioned clusters",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connectivity, credentials and logging. Accepted before or after the subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Entry node used to discover the cluster.
    #[arg(short = 'H', long, env = "RINGMEND_HOST", global = true)]
    pub host: Option<String>,

    /// Reach nodes directly instead of through SSH tunnels.
    #[arg(long, global = true)]
    pub direct: bool,

    /// Management API port (overrides the settings file).
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// SSH user on cluster nodes.
    #[arg(
        short = 'u',
        long = "ssh-user",
        env = "RINGMEND_SSH_USER",
        default_value = "ringmend",
        global = true
    )]
    pub ssh_user: String,

    /// SSH private key. Passphrase-protected keys must be loaded in ssh-agent.
    #[arg(short = 'k', long = "ssh-key", env = "RINGMEND_SSH_KEY", global = true)]
    pub ssh_key: Option<PathBuf>,

    /// TOML settings file.
    #[arg(long, env = "RINGMEND_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging for ringmend crates.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair token ranges, endpoint by endpoint.
    ///
    /// Without a keyspace every keyspace is repaired. Without a table a
    /// failed range is retried table by table after a cooldown.
    Repair {
        keyspace: Option<String>,
        table: Option<String>,
        /// Only repair these hosts.
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        hosts: Vec<String>,
        /// Never repair these hosts.
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        exclude: Vec<String>,
        /// Only repair hosts in this datacenter.
        #[arg(long)]
        dc: Option<String>,
        /// Repair using replicas in each host's own datacenter only.
        #[arg(long)]
        local: bool,
        /// Endpoints repaired at the same time.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Show cluster status per datacenter.
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print version number.
    Version,
}

fn init_tracing(verbose: bool, format: LogFormat) -> anyhow::Result<()> {
    // RUST_LOG wins; -v still raises ringmend crates.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if verbose => filter.add_directive("ringmend=debug".parse()?),
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose { "debug" } else { "info" };
            EnvFilter::try_new(format!("info,ringmend={level}"))?
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose, cli.global.log_format)?;

    match cli.command {
        Commands::Version => {
            commands::version::print();
            Ok(())
        }
        Commands::Status { format } => commands::status::run(&cli.global, &format).await,
        Commands::Repair {
            keyspace,
            table,
            hosts,
            exclude,
            dc,
            local,
            concurrency,
        } => {
            let plan = ringmend_repair::RepairPlan {
                keyspace,
                table,
                hosts,
                exclude,
                datacenter: dc,
                local,
            };
            commands::repair::run(&cli.global, plan, concurrency).await
        }
    }
}
