mod bootstrap_helpers;
mod bridge_runtime;
mod cli_args;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::bridge_runtime::{run_bridge, BridgeRuntimeConfig};
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = BridgeRuntimeConfig::from_cli(&cli)?;
    run_bridge(config).await
}
