//! Jobpower - Main Entry Point
//!
//! Power-tier analysis and model benchmarking for HPC job traces.

use clap::Parser;
use jobpower::cli::{cmd_info, cmd_run, Cli, Commands, RunOverrides};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobpower=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, seed, test_fraction, subsample, k_min, k_max, features, output } => {
            let overrides = RunOverrides { seed, test_fraction, subsample, k_min, k_max, features };
            cmd_run(&data, config.as_deref(), overrides, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
