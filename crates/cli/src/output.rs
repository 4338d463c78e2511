//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or the raw values as JSON
pub fn print_rows<R: Tabled, T: Serialize>(rows: Vec<R>, raw: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(raw),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_warning(&format!("Failed to serialize output: {}", e)),
    }
}

/// Print a bold section header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: u64) -> String {
    if millicores >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.0}%", v),
        None => "-".to_string(),
    }
}

pub fn format_latency(millis: Option<f64>) -> String {
    match millis {
        Some(ms) => format!("{:.1}ms", ms),
        None => "-".to_string(),
    }
}

/// Red at or below the congestion threshold, yellow within 10 points of it
pub fn color_headroom(headroom: f64, threshold: f64) -> String {
    let formatted = format!("{:.0}%", headroom * 100.0);
    if headroom <= threshold {
        formatted.red().to_string()
    } else if headroom < threshold + 0.1 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color a workload outcome kind
pub fn color_outcome(kind: &str) -> String {
    match kind {
        "stable" => kind.green().to_string(),
        "scaled_out" | "scaled_up" | "scaled_down" => kind.cyan().to_string(),
        "external_bottleneck" | "held_during_violation" | "skipped" => {
            kind.yellow().to_string()
        }
        "abandoned" => kind.red().to_string(),
        _ => kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cpu() {
        assert_eq!(format_cpu(250), "250m");
        assert_eq!(format_cpu(1500), "1.5");
    }

    #[test]
    fn test_missing_values_render_as_dash() {
        assert_eq!(format_percent(None), "-");
        assert_eq!(format_latency(None), "-");
        assert_eq!(format_percent(Some(62.4)), "62%");
        assert_eq!(format_latency(Some(12.34)), "12.3ms");
    }
}
