//! Strata CLI
//!
//! `stratacfg` is the operator's surface: an interactive editor for pipeline
//! definitions plus trigger/refresh/status commands. It embeds the engine
//! and talks to the same database the server uses.

mod commands;
mod editor;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};

#[derive(Parser)]
#[command(name = "stratacfg")]
#[command(about = "Strata CI pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    handle_command(cli.command).await
}
