//! # forge-cli: Offline Tooling for the Entity Lifecycle Manager
//!
//! Provides the `forge` command-line interface.
//!
//! ## Subcommands
//!
//! - `forge machines`: print every state machine under a settlement policy.
//! - `forge validate-history`: check that an exported history is a legal
//!   walk through each entity's state machine.
//! - `forge verify-chain`: recompute the audit hash chain of an exported
//!   history.
//!
//! History files are JSON arrays of transition records, exactly as returned
//! by `GET /transitions`. Records of several entities may be mixed; they are
//! grouped by `(entity_type, entity_id)` and ordered by sequence.
//!
//! Every subcommand returns an exit code: 0 on success, 1 when the check
//! fails. Operational errors (unreadable file, malformed JSON) surface as
//! `anyhow` errors and exit with 2.

pub mod history;
pub mod machines;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use forge_lifecycle::{parse_history, EntityKey, StateTransitionRecord};

/// Load an exported history file.
pub fn load_records(path: &Path) -> Result<Vec<StateTransitionRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_history(&content)
        .with_context(|| format!("{} is not a valid transition history", path.display()))
}

/// Group records per entity, each group ordered by sequence.
pub fn group_by_entity(
    records: Vec<StateTransitionRecord>,
) -> BTreeMap<EntityKey, Vec<StateTransitionRecord>> {
    let mut groups: BTreeMap<EntityKey, Vec<StateTransitionRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.key()).or_default().push(record);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.sequence);
    }
    groups
}
