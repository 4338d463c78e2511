//! Podoscaler - closed-loop CPU autoscaler
//!
//! Runs one decision round per poll interval against every Deployment that
//! carries the scope label, and serves health and metrics endpoints.

use anyhow::Result;
use scaler_lib::provider::{KubeProvider, PrometheusLatency};
use scaler_lib::{RoundDriverBuilder, RoundHealth, ScalerMetrics, StructuredLogger};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting podoscaler");

    // Invalid configuration is fatal
    let config = config::AppConfig::load()?;
    info!(
        instance = %config.instance_name,
        namespace = ?config.namespace,
        prometheus_url = %config.prometheus_url,
        "Scaler configured"
    );

    let latency = PrometheusLatency::new(&config.prometheus_url)?
        .with_metric(&config.latency_metric)
        .with_window(&config.latency_window);
    let provider =
        KubeProvider::connect(config.kube_provider_config(), Arc::new(latency), None).await?;

    let metrics = ScalerMetrics::new();
    let health = RoundHealth::new(config.poll_interval());
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(SCALER_VERSION, config.poll_interval_secs, &config.scope_label);

    let driver = RoundDriverBuilder::new()
        .provider(Arc::new(provider))
        .config(config.scaler_config())
        .metrics(metrics.clone())
        .health(health.clone())
        .logger(logger.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(api::AppState::new(health, metrics));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let driver_handle = tokio::spawn(driver.run(config.poll_interval(), shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    driver_handle.await?;
    match api_handle.await? {
        Ok(()) => info!("API server stopped"),
        Err(e) => error!(error = %e, "API server failed"),
    }

    Ok(())
}
