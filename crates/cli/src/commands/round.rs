//! One-shot decision round

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use scaler_lib::config::{
    DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD, DEFAULT_LATENCY_THRESHOLD_MILLIS,
    DEFAULT_MAX_ALLOCATION_PER_REPLICA, DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD,
    DEFAULT_MIN_REQUEST_FLOOR,
};
use scaler_lib::{RoundDriverBuilder, RoundSummary, ScalerConfig, StructuredLogger};
use tabled::Tabled;

use super::Session;
use crate::output::{
    color_outcome, print_header, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

/// Scaling thresholds for a single round
#[derive(Args, Debug, Clone)]
pub struct RoundArgs {
    /// Headroom fraction at or below which a node is congested
    #[arg(long, default_value_t = DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD)]
    pub min_node_availability: f64,

    /// Utilization ratio below which a workload is shrunk
    #[arg(long, default_value_t = DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD)]
    pub downscale_threshold: f64,

    /// Per-replica CPU ceiling in millicores
    #[arg(long, default_value_t = DEFAULT_MAX_ALLOCATION_PER_REPLICA)]
    pub max_allocation_per_replica: u64,

    /// Lowest request a downscale may set, in millicores
    #[arg(long, default_value_t = DEFAULT_MIN_REQUEST_FLOOR)]
    pub min_request_floor: u64,

    /// p99 latency SLO in milliseconds
    #[arg(long, default_value_t = DEFAULT_LATENCY_THRESHOLD_MILLIS)]
    pub latency_threshold_ms: u64,
}

impl RoundArgs {
    pub fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            min_node_availability_threshold: self.min_node_availability,
            downscale_utilization_threshold: self.downscale_threshold,
            max_allocation_per_replica: self.max_allocation_per_replica,
            min_request_floor: self.min_request_floor,
            latency_threshold_millis: self.latency_threshold_ms,
        }
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Workload")]
    name: String,
    #[tabled(rename = "SLO")]
    slo: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Actions")]
    actions: usize,
}

/// Run exactly one round against the live cluster and print what it did
pub async fn run_round(session: &Session, args: &RoundArgs) -> Result<()> {
    let provider = session.provider().await?;
    let mut driver = RoundDriverBuilder::new()
        .provider(provider)
        .config(args.scaler_config())
        .logger(StructuredLogger::new("posctl"))
        .build()?;

    let summary = driver.run_round().await?;

    match session.format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Table => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &RoundSummary) {
    print_header("Round Summary");
    println!(
        "Nodes:    {} observed, {} skipped",
        summary.nodes_observed, summary.nodes_skipped
    );
    println!("Duration: {}ms", summary.duration_ms);
    println!();

    let rows: Vec<ReportRow> = summary
        .workloads
        .iter()
        .map(|r| ReportRow {
            namespace: r.workload.namespace.clone(),
            name: r.workload.name.clone(),
            slo: if r.slo_violated {
                "violated".red().to_string()
            } else {
                "ok".green().to_string()
            },
            outcome: color_outcome(r.outcome.kind()),
            actions: r.actions.len(),
        })
        .collect();
    print_rows(rows, &summary.workloads, OutputFormat::Table);

    if summary.action_count() > 0 {
        println!("\n{}", "Actions".bold());
        for action in summary.actions() {
            println!("  - {}", action);
        }
    }
    println!();

    if summary.error_count() > 0 {
        print_warning(&format!(
            "{} workloads abandoned, see --verbose output",
            summary.error_count()
        ));
    } else {
        print_success(&format!(
            "Round complete, {} actions issued",
            summary.action_count()
        ));
    }
}
