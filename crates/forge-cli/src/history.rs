//! # History Subcommands
//!
//! `validate-history` replays each entity's records against the transition
//! table; `verify-chain` recomputes the SHA-256 chain. Both read a history
//! file exported from `GET /transitions`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use forge_lifecycle::{verify_chain, StateTransitionRecord};
use forge_state::{
    validate_walk, LifecycleState, TransactionSettlement, TransitionPolicy, TransitionTable,
    WalkError,
};

/// Arguments for the `forge validate-history` subcommand.
#[derive(Args, Debug)]
pub struct ValidateHistoryArgs {
    /// History file (JSON array of transition records).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// State each entity was registered in. Defaults to the first record's
    /// `from_state`.
    #[arg(long, value_name = "STATE")]
    pub initial: Option<String>,

    /// Transaction settlement policy the history was recorded under.
    #[arg(long, default_value = "staged")]
    pub settlement: TransactionSettlement,
}

/// Arguments for the `forge verify-chain` subcommand.
#[derive(Args, Debug)]
pub struct VerifyChainArgs {
    /// History file (JSON array of transition records).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn run_validate_history(args: &ValidateHistoryArgs) -> Result<u8> {
    let table = TransitionTable::new(TransitionPolicy {
        transaction_settlement: args.settlement,
    });
    let groups = crate::group_by_entity(load(&args.file)?);

    let mut failures = 0usize;
    for (key, records) in &groups {
        let start = match &args.initial {
            Some(name) => LifecycleState::parse(key.entity_type, name)
                .with_context(|| format!("--initial does not apply to {key}"))?,
            None => records[0].from_state,
        };
        match check_walk(&table, start, records) {
            Ok(end) => println!("OK   {key}: {} record(s), now {end}", records.len()),
            Err(err) => {
                failures += 1;
                println!("FAIL {key}: {err}");
            }
        }
    }

    println!("{} entit(ies) checked, {failures} invalid", groups.len());
    Ok(u8::from(failures > 0))
}

pub fn run_verify_chain(args: &VerifyChainArgs) -> Result<u8> {
    let groups = crate::group_by_entity(load(&args.file)?);

    let mut failures = 0usize;
    for (key, records) in &groups {
        match verify_chain(records).into_result() {
            Ok(()) => println!("OK   {key}: chain of {} record(s) intact", records.len()),
            Err(err) => {
                failures += 1;
                println!("FAIL {key}: {err}");
            }
        }
    }

    println!("{} chain(s) checked, {failures} broken", groups.len());
    Ok(u8::from(failures > 0))
}

fn load(path: &Path) -> Result<Vec<StateTransitionRecord>> {
    let records = crate::load_records(path)?;
    tracing::info!(path = %path.display(), records = records.len(), "history loaded");
    Ok(records)
}

/// Replay one entity's records. On failure, reports the offending record's
/// sequence number.
fn check_walk(
    table: &TransitionTable,
    start: LifecycleState,
    records: &[StateTransitionRecord],
) -> Result<LifecycleState, String> {
    validate_walk(table, start, records.iter().map(|r| (r.from_state, r.to_state))).map_err(
        |err| {
            let sequence = records[err.index()].sequence;
            match err {
                WalkError::Discontinuity {
                    expected, found, ..
                } => format!("sequence {sequence} starts at {found}, expected {expected}"),
                WalkError::IllegalEdge { from, to, .. } => {
                    format!("sequence {sequence} takes illegal edge {from} -> {to}")
                }
            }
        },
    )
}
