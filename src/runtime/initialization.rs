//! # Initialization
//!
//! Process startup: rustls provider, tracing subscriber, metrics registry,
//! probe server, and the Kubernetes client. Everything the manager needs is
//! handed back in one bundle.

use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

use crate::constants::DEFAULT_METRICS_PORT;
use crate::crd::configuration::Configuration;
use crate::crd::stack::Stack;
use crate::observability::metrics;
use crate::observability::server::{start_server, ServerState};

/// Everything initialization produces for the manager.
pub struct InitializationResult {
    pub client: Client,
    pub server_state: Arc<ServerState>,
}

/// Initialize the operator runtime.
///
/// Handles, in order:
/// - rustls crypto provider setup
/// - tracing subscriber setup
/// - metrics registration
/// - probe and metrics server startup
/// - Kubernetes client creation and CRD availability check
pub async fn initialize() -> Result<InitializationResult> {
    // rustls 0.23 needs a process-wide provider installed before any TLS
    // connection is attempted; ring is the one we ship.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stack_operator=info".into()),
        )
        .init();

    info!("Starting Stack operator");

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);
    let server_state_clone = server_state.clone();
    tokio::spawn(async move {
        if let Err(err) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {err:#}");
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    // Verify the CRDs are installed and queryable before the watches start,
    // so a missing CRD fails loudly at startup instead of looping.
    let stacks: Api<Stack> = Api::all(client.clone());
    let existing = stacks
        .list(&ListParams::default())
        .await
        .context("Stack CRD is not queryable")?;
    let configurations: Api<Configuration> = Api::all(client.clone());
    let seeds = configurations
        .list(&ListParams::default())
        .await
        .context("Configuration CRD is not queryable")?;
    info!(
        stacks = existing.items.len(),
        configurations = seeds.items.len(),
        "CRDs are queryable"
    );

    Ok(InitializationResult {
        client,
        server_state,
    })
}
