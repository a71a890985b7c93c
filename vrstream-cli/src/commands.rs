//! CLI command implementations

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Subcommand;
use vrstream_core::{ClientConfig, StreamingClient, TraceTable, VrStreamError};
use vrstream_sim::{Scenario, StreamingSimulation};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated streaming session
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Trace dataset overriding the configured one
        #[arg(short, long, conflicts_with = "no_trace")]
        trace: Option<PathBuf>,
        /// Run without a trace; every request uses the default reply length
        #[arg(long)]
        no_trace: bool,
        /// Link and timing scenario (steady, flaky or bounded)
        #[arg(short, long, default_value = "steady")]
        scenario: Scenario,
        /// Seed for the simulated link
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Simulation horizon in seconds, overriding the scenario's
        #[arg(long)]
        horizon: Option<f64>,
        /// Directory for bufferSize.csv and playbackPointer.csv
        #[arg(long)]
        metrics_dir: Option<PathBuf>,
    },
    /// Look up the reply size recorded for a trace time index
    Lookup {
        /// Trace dataset
        trace: PathBuf,
        /// Time index to look up
        time: f64,
    },
}

impl Commands {
    /// Directory that receives the run log next to the metric files.
    pub fn run_dir(&self) -> Option<&Path> {
        match self {
            Commands::Run { metrics_dir, .. } => metrics_dir.as_deref(),
            Commands::Lookup { .. } => None,
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            config,
            trace,
            no_trace,
            scenario,
            seed,
            horizon,
            metrics_dir,
        } => {
            let mut client_config = load_config(config.as_deref())?;
            if no_trace {
                client_config.trace_path = None;
            } else if let Some(trace) = trace {
                client_config.trace_path = Some(trace);
            }
            if metrics_dir.is_some() {
                client_config.metrics_dir = metrics_dir;
            }
            run_simulation(client_config, scenario, seed, horizon)
        }
        Commands::Lookup { trace, time } => lookup(&trace, time),
    }
}

/// Loads configuration from `path`, or defaults, then applies environment
/// overrides.
///
/// # Errors
/// - Configuration file cannot be read or parsed
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Runs one simulated session and prints its report.
///
/// # Errors
/// - Configuration is invalid or the trace cannot be loaded
/// - Simulation aborts
pub fn run_simulation(
    mut config: ClientConfig,
    scenario: Scenario,
    seed: u64,
    horizon: Option<f64>,
) -> anyhow::Result<()> {
    scenario.apply(&mut config);

    let mut sim_config = scenario.simulation_config(seed);
    if let Some(seconds) = horizon {
        let horizon = Duration::try_from_secs_f64(seconds)
            .map_err(|_| anyhow!("Invalid horizon: {seconds} seconds"))?;
        sim_config.horizon = Some(horizon);
    }

    tracing::info!("Running {scenario} scenario with seed {seed}");
    let client = StreamingClient::from_config(config).map_err(describe)?;
    let mut sim = StreamingSimulation::new(sim_config, client).with_default_invariants();
    let report = sim.run().context("Simulation aborted")?;

    println!("{}", report.summary());
    if !report.success {
        return Err(anyhow!(
            "{} invariant violations detected",
            report.metrics.invariant_violations.len()
        ));
    }
    Ok(())
}

/// Prints the reply size recorded for `time` in the trace at `path`.
///
/// # Errors
/// - Trace file cannot be opened or read
pub fn lookup(path: &Path, time: f64) -> anyhow::Result<()> {
    let trace = TraceTable::load(path).map_err(|e| describe(e.into()))?;

    match trace.lookup(time) {
        Some(size) => println!("{time}: {size} bytes"),
        None => println!("{time}: no entry ({} entries in trace)", trace.len()),
    }
    Ok(())
}

fn describe(error: VrStreamError) -> anyhow::Error {
    if error.is_user_error() {
        anyhow!(error.user_message())
    } else {
        anyhow::Error::new(error)
    }
}
