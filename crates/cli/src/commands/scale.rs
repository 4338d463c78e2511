//! Manual scaling

use anyhow::{Context, Result};
use scaler_lib::Action;

use super::Session;
use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Set a workload's replica count and wait for it to converge
pub async fn scale_replicas(
    session: &Session,
    namespace: &str,
    workload: &str,
    replicas: u32,
) -> Result<()> {
    let provider = session.provider().await?;

    if let OutputFormat::Table = session.format {
        print_info(&format!(
            "Scaling {}/{} to {} replicas...",
            namespace, workload, replicas
        ));
    }

    provider
        .set_replica_count(namespace, workload, replicas)
        .await
        .with_context(|| format!("Failed to scale {}/{}", namespace, workload))?;

    report(
        session.format,
        Action::ReplicaCountChange {
            namespace: namespace.to_string(),
            workload: workload.to_string(),
            replicas,
        },
    );
    Ok(())
}

/// Resize one container's CPU request in place
pub async fn scale_cpu(
    session: &Session,
    namespace: &str,
    pod: &str,
    container: &str,
    millis: u64,
) -> Result<()> {
    let provider = session.provider().await?;

    provider
        .set_cpu_request(namespace, pod, container, millis)
        .await
        .with_context(|| format!("Failed to resize {}/{}", namespace, pod))?;

    report(
        session.format,
        Action::VerticalScale {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            request_millis: millis,
        },
    );
    Ok(())
}

fn report(format: OutputFormat, action: Action) {
    match format {
        OutputFormat::Json => print_json(&action),
        OutputFormat::Table => print_success(&format!("Applied: {}", action)),
    }
}
