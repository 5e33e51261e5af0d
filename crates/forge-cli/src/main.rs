//! # forge CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use forge_cli::history::{run_validate_history, run_verify_chain, ValidateHistoryArgs, VerifyChainArgs};
use forge_cli::machines::{run_machines, MachinesArgs};

/// InnoCap Forge lifecycle tooling.
///
/// Inspects the entity state machines and checks audit histories exported
/// from the lifecycle API.
#[derive(Parser, Debug)]
#[command(name = "forge", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the state machine of every entity type.
    Machines(MachinesArgs),

    /// Check that an exported history is a legal walk for every entity.
    ValidateHistory(ValidateHistoryArgs),

    /// Recompute the audit hash chain of an exported history.
    VerifyChain(VerifyChainArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Machines(args) => run_machines(&args),
        Commands::ValidateHistory(args) => run_validate_history(&args),
        Commands::VerifyChain(args) => run_verify_chain(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
