//! Periodic read-only sampling

use anyhow::{bail, Context, Result};
use scaler_lib::config::DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD;
use scaler_lib::Watcher;
use std::path::PathBuf;
use std::time::Duration;

use super::Session;
use crate::output::{print_info, print_success};

/// Record `rounds` samples and write them as JSON to `output` or stdout
pub async fn record(
    session: &Session,
    rounds: usize,
    interval_secs: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    if rounds == 0 {
        bail!("--rounds must be at least 1");
    }

    let provider = session.provider().await?;
    let watcher = Watcher::new(provider, DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD);

    if output.is_some() {
        print_info(&format!(
            "Recording {} rounds, {}s apart",
            rounds, interval_secs
        ));
    }

    let data = watcher
        .record(rounds, Duration::from_secs(interval_secs))
        .await?;
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!(
                "Wrote {} rounds to {}",
                data.len(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }

    Ok(())
}
