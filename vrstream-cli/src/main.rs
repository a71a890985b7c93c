//! VRStream CLI - Command-line interface
//!
//! Runs simulated streaming sessions and inspects trace datasets.

mod commands;

use clap::Parser;
use vrstream_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "vrstream")]
#[command(about = "Adaptive video streaming client simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: CliLogLevel,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.command.run_dir())?;
    commands::handle_command(cli.command)?;

    Ok(())
}
