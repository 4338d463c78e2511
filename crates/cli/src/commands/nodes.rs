//! Node inspection

use anyhow::Result;
use scaler_lib::Watcher;
use tabled::Tabled;

use super::Session;
use crate::output::{color_headroom, format_cpu, print_header, print_rows, OutputFormat};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Allocatable")]
    allocatable: String,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Headroom")]
    headroom: String,
}

/// Show usage, allocatable and headroom for every schedulable node
pub async fn show_nodes(session: &Session, min_node_availability: f64) -> Result<()> {
    let provider = session.provider().await?;
    let samples = Watcher::new(provider, min_node_availability)
        .sample_nodes()
        .await?;

    if let OutputFormat::Table = session.format {
        print_header("Nodes");
    }

    let rows: Vec<NodeRow> = samples
        .iter()
        .map(|s| NodeRow {
            name: s.node.name.clone(),
            usage: format_cpu(s.node.usage_millis),
            allocatable: format_cpu(s.node.allocatable_millis),
            capacity: format_cpu(s.node.capacity_millis),
            headroom: color_headroom(s.headroom, min_node_availability),
        })
        .collect();
    print_rows(rows, &samples, session.format);

    if let OutputFormat::Table = session.format {
        let congested = samples
            .iter()
            .filter(|s| s.headroom <= min_node_availability)
            .count();
        println!("\nTotal: {} nodes, {} congested", samples.len(), congested);
    }

    Ok(())
}
