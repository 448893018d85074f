//! Container Executor
//!
//! Backs functions of executor type `container` with a Service, a Deployment
//! and a HorizontalPodAutoscaler each:
//! - Creates the backend on first lookup, once per function UID
//! - Applies function updates to the HPA or the Deployment
//! - Scales idle functions down to their minimum
//! - Adopts existing backends, or removes orphans, at startup

mod api;
mod backoff;
mod config;
mod controller;
mod diff;
mod error;
mod executor;
mod metrics;
mod naming;
mod reaper;
mod resources;
mod validation;
mod watcher;

#[cfg(test)]
mod executor_test;
#[cfg(test)]
mod test_utils;

use crate::config::ExecutorConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls backend needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting Container Executor");

    let config = ExecutorConfig::from_env()?;
    info!("Configuration:");
    info!("  Instance ID: {}", config.instance_id);
    info!(
        "  Namespaces: {}",
        if config.watch_namespaces.is_empty() {
            "all namespaces".to_string()
        } else {
            config.watch_namespaces.join(",")
        }
    );
    info!("  Default idle timeout: {:?}", config.default_idle_timeout);
    info!("  Adopt existing resources: {}", config.adopt_existing_resources);
    info!("  HTTP address: {}", config.http_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
