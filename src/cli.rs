//! # stackctl CLI
//!
//! Command-line interface for the Stack operator.
//!
//! Lets operators trigger reconciliations and inspect Stacks without digging
//! through `kubectl get -o yaml` output.
//!
//! ## Usage
//!
//! ```bash
//! # Trigger reconciliation for a Stack
//! stackctl reconcile --name acme
//!
//! # List all Stacks
//! stackctl list
//!
//! # Show conditions of a Stack
//! stackctl status --name acme
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

use stack_operator::constants::API_GROUP;
use stack_operator::crd::condition::{get_condition, types, ConditionHolder};
use stack_operator::crd::Stack;

/// Stack operator CLI
#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Stack operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger reconciliation for a Stack
    Reconcile {
        /// Name of the Stack
        #[arg(short, long)]
        name: String,
    },
    /// List all Stacks
    List,
    /// Show conditions of a Stack
    Status {
        /// Name of the Stack
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let stacks: Api<Stack> = Api::all(client);

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(stacks, name).await,
        Commands::List => list_command(stacks).await,
        Commands::Status { name } => status_command(stacks, name).await,
    }
}

/// Trigger reconciliation by bumping an annotation the watch picks up.
async fn reconcile_command(stacks: Api<Stack>, name: String) -> Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string();

    let patch = json!({
        "metadata": {
            "annotations": {
                (format!("{API_GROUP}/reconcile")): timestamp
            }
        }
    });

    stacks
        .patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for Stack '{name}'"))?;

    println!("Reconciliation triggered for Stack '{name}' at {timestamp}");
    Ok(())
}

async fn list_command(stacks: Api<Stack>) -> Result<()> {
    let list = stacks
        .list(&ListParams::default())
        .await
        .context("Failed to list Stacks")?;

    if list.items.is_empty() {
        println!("No Stacks found.");
        return Ok(());
    }

    println!(
        "{:<30} {:<30} {:<20} {:<8}",
        "NAME", "HOST", "SEED", "READY"
    );
    for stack in list.items {
        let ready = get_condition(stack.conditions(), types::READY)
            .map(|c| c.status.to_string())
            .unwrap_or_else(|| "Unknown".into());
        println!(
            "{:<30} {:<30} {:<20} {:<8}",
            stack.name_any(),
            stack.spec.host,
            stack.spec.seed,
            ready
        );
    }
    Ok(())
}

async fn status_command(stacks: Api<Stack>, name: String) -> Result<()> {
    let stack = stacks
        .get(&name)
        .await
        .with_context(|| format!("Failed to fetch Stack '{name}'"))?;

    println!("Stack: {}", stack.name_any());
    println!("Namespace: {}", stack.spec.namespace);
    println!("Base URL: {}", stack.spec.base_url());
    println!();

    let conditions = stack.conditions();
    if conditions.is_empty() {
        println!("No conditions reported yet.");
        return Ok(());
    }

    println!("{:<25} {:<8} {:<12} MESSAGE", "TYPE", "STATUS", "GENERATION");
    for condition in conditions {
        println!(
            "{:<25} {:<8} {:<12} {}",
            condition.r#type,
            condition.status.to_string(),
            condition
                .observed_generation
                .map(|g| g.to_string())
                .unwrap_or_default(),
            condition.message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
