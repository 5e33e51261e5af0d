//! # Machines Subcommand
//!
//! Prints the legal edges of every entity type, as text or JSON.

use anyhow::{Context, Result};
use clap::Args;
use forge_state::{EntityType, MachineDescription, TransactionSettlement, TransitionPolicy, TransitionTable};

/// Arguments for the `forge machines` subcommand.
#[derive(Args, Debug)]
pub struct MachinesArgs {
    /// Transaction settlement policy: `staged` or `direct`.
    #[arg(long, default_value = "staged")]
    pub settlement: TransactionSettlement,

    /// Restrict output to one entity type.
    #[arg(long, value_name = "TYPE")]
    pub entity_type: Option<EntityType>,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

pub fn run_machines(args: &MachinesArgs) -> Result<u8> {
    let table = TransitionTable::new(TransitionPolicy {
        transaction_settlement: args.settlement,
    });
    let descriptions: Vec<MachineDescription> = EntityType::ALL
        .iter()
        .filter(|t| args.entity_type.map_or(true, |only| only == **t))
        .map(|t| table.describe(*t))
        .collect();

    if args.json {
        let json = serde_json::to_string_pretty(&descriptions)
            .context("failed to serialize state machines")?;
        println!("{json}");
    } else {
        print!("{}", render_text(&descriptions));
    }
    Ok(0)
}

/// Human-readable listing, one block per entity type.
pub fn render_text(descriptions: &[MachineDescription]) -> String {
    let mut out = String::new();
    for d in descriptions {
        out.push_str(&format!("{} (initial: {})\n", d.entity_type, d.initial_state));
        for state in &d.states {
            let next: Vec<&str> = d
                .transitions
                .iter()
                .filter(|e| e.from == *state)
                .map(|e| e.to.name())
                .collect();
            if next.is_empty() {
                out.push_str(&format!("  {state} (terminal)\n"));
            } else {
                out.push_str(&format!("  {state} -> {}\n", next.join(", ")));
            }
        }
        out.push('\n');
    }
    out
}
