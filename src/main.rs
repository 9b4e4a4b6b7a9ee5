//! # Stack Operator
//!
//! Entry point: brings up the runtime and runs the controller manager until
//! shutdown.

use anyhow::Result;

use stack_operator::runtime::{initialize, manager};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    manager::run(init.client, init.server_state).await?;
    Ok(())
}
