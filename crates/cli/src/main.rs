//! Podoscaler CLI
//!
//! Inspect nodes and managed workloads, record samples, scale by hand,
//! and run single decision rounds against a live cluster.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{nodes, round, scale, watch, workloads, Session};
use scaler_lib::config::DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD;
use scaler_lib::provider::DEFAULT_SCOPE_LABEL;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";

/// Podoscaler CLI
#[derive(Parser)]
#[command(name = "posctl")]
#[command(author, version, about = "CLI for the podoscaler CPU autoscaler", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default inference if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Restrict to one namespace
    #[arg(long, short, global = true)]
    pub namespace: Option<String>,

    /// Label selector for managed Deployments
    #[arg(long, env = "PODOSCALER_SCOPE_LABEL", global = true)]
    pub scope_label: Option<String>,

    /// Prometheus base URL for latency reads
    #[arg(long, env = "PODOSCALER_PROMETHEUS_URL", global = true)]
    pub prometheus_url: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show node usage and headroom
    Nodes {
        /// Headroom fraction at or below which a node is congested
        #[arg(long, default_value_t = DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD)]
        min_node_availability: f64,
    },

    /// Show managed workloads
    Workloads,

    /// Record cluster samples as JSON
    Watch {
        /// Number of samples to take
        #[arg(long, default_value_t = 10)]
        rounds: usize,

        /// Seconds between samples
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Output file path (stdout if not specified)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Scale a workload or pod by hand
    #[command(subcommand)]
    Scale(ScaleCommands),

    /// Run one decision round and print the summary
    Round(round::RoundArgs),
}

#[derive(Subcommand)]
pub enum ScaleCommands {
    /// Set the replica count of a Deployment
    Replicas {
        namespace: String,
        workload: String,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },

    /// Set the CPU request of one container, in millicores
    Cpu {
        namespace: String,
        pod: String,
        container: String,
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        millis: u64,
    },
}

impl Cli {
    /// Fill unset flags from the config file, then built-in defaults
    fn session(&self, file: config::Config) -> Session {
        Session {
            kubeconfig: self.kubeconfig.clone(),
            namespace: self.namespace.clone().or(file.namespace.clone()),
            scope_label: self
                .scope_label
                .clone()
                .or(file.scope_label.clone())
                .unwrap_or_else(|| DEFAULT_SCOPE_LABEL.to_string()),
            prometheus_url: self
                .prometheus_url
                .clone()
                .or(file.prometheus_url.clone())
                .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string()),
            format: self
                .format
                .or_else(|| file.output_format())
                .unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let file_config = config::Config::load().unwrap_or_else(|e| {
        output::print_warning(&format!("Ignoring CLI config: {:#}", e));
        config::Config::default()
    });
    let session = cli.session(file_config);

    match cli.command {
        Commands::Nodes {
            min_node_availability,
        } => {
            nodes::show_nodes(&session, min_node_availability).await?;
        }
        Commands::Workloads => {
            workloads::show_workloads(&session).await?;
        }
        Commands::Watch {
            rounds,
            interval_secs,
            output,
        } => {
            watch::record(&session, rounds, interval_secs, output).await?;
        }
        Commands::Scale(scale_cmd) => match scale_cmd {
            ScaleCommands::Replicas {
                namespace,
                workload,
                count,
            } => {
                scale::scale_replicas(&session, &namespace, &workload, count).await?;
            }
            ScaleCommands::Cpu {
                namespace,
                pod,
                container,
                millis,
            } => {
                scale::scale_cpu(&session, &namespace, &pod, &container, millis).await?;
            }
        },
        Commands::Round(args) => {
            round::run_round(&session, &args).await?;
        }
    }

    Ok(())
}
