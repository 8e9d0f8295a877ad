use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use items_core::provision::plan;
use items_core::{Deployment, ProvisioningError, Topology};

/// Inspect the items service topology without touching any backend.
#[derive(Parser)]
#[command(name = "items-topology", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the topology description as JSON.
    Synth {
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show what applying the topology would change.
    Plan {
        /// Topology JSON; the built-in items service if omitted.
        #[arg(long, env = "ITEMS_TOPOLOGY")]
        topology: Option<PathBuf>,
        /// Recorded deployment to diff against; a fresh deploy if omitted.
        #[arg(long, env = "ITEMS_STATE_FILE")]
        state: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Synth { out } => {
            let json = Topology::items_service().to_json_pretty()?;
            match out {
                Some(path) => std::fs::write(&path, json).map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?,
                None => println!("{json}"),
            }
        }
        Command::Plan { topology, state } => {
            let topology = match topology {
                Some(path) => Topology::from_json(&read(&path)?)?,
                None => Topology::items_service(),
            };
            let previous = match state.filter(|p| p.exists()) {
                Some(path) => Some(Deployment::from_json(&read(&path)?)?),
                None => None,
            };

            let desired = Deployment::resolve(&topology, Utc::now())?;
            print!("{}", plan(previous.as_ref(), &desired)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("items-topology: {e}");
            ExitCode::FAILURE
        }
    }
}
