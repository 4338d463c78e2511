//! Managed workload inspection

use anyhow::Result;
use colored::Colorize;
use scaler_lib::config::DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD;
use scaler_lib::Watcher;
use tabled::Tabled;

use super::Session;
use crate::output::{
    format_cpu, format_latency, format_percent, print_header, print_rows, OutputFormat,
};

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Workload")]
    name: String,
    #[tabled(rename = "Pods")]
    pods: usize,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Allocation")]
    allocation: String,
    #[tabled(rename = "Util %")]
    utilization_percent: String,
    #[tabled(rename = "p99")]
    latency: String,
}

/// Show every workload carrying the scope label
pub async fn show_workloads(session: &Session) -> Result<()> {
    let provider = session.provider().await?;
    let samples = Watcher::new(provider, DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD)
        .sample_workloads()
        .await?;

    if let OutputFormat::Table = session.format {
        print_header("Managed Workloads");
        println!("Scope: {}", session.scope_label.cyan());
        println!();
    }

    let rows: Vec<WorkloadRow> = samples
        .iter()
        .map(|s| WorkloadRow {
            namespace: s.workload.namespace.clone(),
            name: s.workload.name.clone(),
            pods: s.num_pods,
            utilization: format_cpu(s.utilization_millis),
            allocation: format_cpu(s.allocation_millis),
            utilization_percent: format_percent(s.utilization_percent()),
            latency: format_latency(s.latency_millis),
        })
        .collect();
    print_rows(rows, &samples, session.format);

    Ok(())
}
