//! # Entity Types, Tagged States, and the Transition Table
//!
//! [`LifecycleState`] unifies the per-type state enums so that a single
//! manager can govern every entity type. A `LifecycleState` always knows
//! which entity type it belongs to; an edge between states of different
//! types is never legal.
//!
//! The [`TransitionTable`] is the only place legality is decided. It is built
//! once from a [`TransitionPolicy`] and then shared read-only.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use forge_core::ValidationError;
use serde::{Deserialize, Serialize, Serializer};

use crate::escrow::EscrowState;
use crate::milestone::MilestoneState;
use crate::project::ProjectState;
use crate::transaction::TransactionState;
use crate::user::UserState;

/// The governed entity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Project,
    Milestone,
    EscrowAccount,
    Transaction,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: &'static [EntityType] = &[
        Self::User,
        Self::Project,
        Self::Milestone,
        Self::EscrowAccount,
        Self::Transaction,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Project => "Project",
            Self::Milestone => "Milestone",
            Self::EscrowAccount => "EscrowAccount",
            Self::Transaction => "Transaction",
        }
    }

    /// State an entity of this type is created in.
    pub fn initial_state(&self) -> LifecycleState {
        match self {
            Self::User => LifecycleState::User(UserState::initial()),
            Self::Project => LifecycleState::Project(ProjectState::initial()),
            Self::Milestone => LifecycleState::Milestone(MilestoneState::initial()),
            Self::EscrowAccount => LifecycleState::Escrow(EscrowState::initial()),
            Self::Transaction => LifecycleState::Transaction(TransactionState::initial()),
        }
    }

    /// Every state of this type's machine.
    pub fn states(&self) -> Vec<LifecycleState> {
        match self {
            Self::User => UserState::ALL.iter().copied().map(LifecycleState::User).collect(),
            Self::Project => ProjectState::ALL
                .iter()
                .copied()
                .map(LifecycleState::Project)
                .collect(),
            Self::Milestone => MilestoneState::ALL
                .iter()
                .copied()
                .map(LifecycleState::Milestone)
                .collect(),
            Self::EscrowAccount => EscrowState::ALL
                .iter()
                .copied()
                .map(LifecycleState::Escrow)
                .collect(),
            Self::Transaction => TransactionState::ALL
                .iter()
                .copied()
                .map(LifecycleState::Transaction)
                .collect(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownEntityType(s.to_string()))
    }
}

/// A state tagged with the entity type it belongs to.
///
/// Serializes as the bare canonical state name. There is no `Deserialize`
/// impl: names such as `Rejected` are shared across types, so parsing always
/// goes through [`LifecycleState::parse`] with an explicit entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    User(UserState),
    Project(ProjectState),
    Milestone(MilestoneState),
    Escrow(EscrowState),
    Transaction(TransactionState),
}

impl LifecycleState {
    /// Parse a state name for the given entity type.
    ///
    /// A name that exists only for other entity types is reported as
    /// [`ValidationError::StateTypeMismatch`]; a name unknown everywhere as
    /// [`ValidationError::UnknownState`].
    pub fn parse(entity_type: EntityType, name: &str) -> Result<Self, ValidationError> {
        if let Some(state) = Self::parse_exact(entity_type, name) {
            return Ok(state);
        }
        let known_elsewhere = EntityType::ALL
            .iter()
            .any(|other| Self::parse_exact(*other, name).is_some());
        if known_elsewhere {
            Err(ValidationError::StateTypeMismatch {
                entity_type: entity_type.to_string(),
                state: name.to_string(),
            })
        } else {
            Err(ValidationError::UnknownState {
                entity_type: entity_type.to_string(),
                state: name.to_string(),
            })
        }
    }

    fn parse_exact(entity_type: EntityType, name: &str) -> Option<Self> {
        match entity_type {
            EntityType::User => UserState::parse(name).map(Self::User),
            EntityType::Project => ProjectState::parse(name).map(Self::Project),
            EntityType::Milestone => MilestoneState::parse(name).map(Self::Milestone),
            EntityType::EscrowAccount => EscrowState::parse(name).map(Self::Escrow),
            EntityType::Transaction => TransactionState::parse(name).map(Self::Transaction),
        }
    }

    /// Entity type this state belongs to.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::User(_) => EntityType::User,
            Self::Project(_) => EntityType::Project,
            Self::Milestone(_) => EntityType::Milestone,
            Self::Escrow(_) => EntityType::EscrowAccount,
            Self::Transaction(_) => EntityType::Transaction,
        }
    }

    /// Canonical wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::User(s) => s.name(),
            Self::Project(s) => s.name(),
            Self::Milestone(s) => s.name(),
            Self::Escrow(s) => s.name(),
            Self::Transaction(s) => s.name(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::User(s) => s.is_terminal(),
            Self::Project(s) => s.is_terminal(),
            Self::Milestone(s) => s.is_terminal(),
            Self::Escrow(s) => s.is_terminal(),
            Self::Transaction(s) => s.is_terminal(),
        }
    }

    /// Whether entering this state requires a non-blank reason.
    pub fn requires_reason(&self) -> bool {
        match self {
            Self::User(s) => s.is_rejection(),
            Self::Project(s) => s.is_rejection(),
            Self::Milestone(s) => s.is_rejection(),
            Self::Escrow(s) => s.is_rejection(),
            Self::Transaction(s) => s.is_rejection(),
        }
    }

    fn standard_transitions(&self) -> Vec<LifecycleState> {
        match self {
            Self::User(s) => s.standard_transitions().iter().copied().map(Self::User).collect(),
            Self::Project(s) => s
                .standard_transitions()
                .iter()
                .copied()
                .map(Self::Project)
                .collect(),
            Self::Milestone(s) => s
                .standard_transitions()
                .iter()
                .copied()
                .map(Self::Milestone)
                .collect(),
            Self::Escrow(s) => s
                .standard_transitions()
                .iter()
                .copied()
                .map(Self::Escrow)
                .collect(),
            Self::Transaction(s) => s
                .standard_transitions()
                .iter()
                .copied()
                .map(Self::Transaction)
                .collect(),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LifecycleState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// How wallet transactions are allowed to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSettlement {
    /// Every transaction passes through `verifying`.
    #[default]
    Staged,
    /// `pending` may settle directly to `completed` or `rejected`.
    Direct,
}

impl TransactionSettlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Direct => "direct",
        }
    }
}

impl FromStr for TransactionSettlement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staged" => Ok(Self::Staged),
            "direct" => Ok(Self::Direct),
            other => Err(format!(
                "unknown transaction settlement {other:?} (expected \"staged\" or \"direct\")"
            )),
        }
    }
}

/// Configurable knobs of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionPolicy {
    pub transaction_settlement: TransactionSettlement,
}

/// Serializable description of one entity type's machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDescription {
    pub entity_type: EntityType,
    pub initial_state: LifecycleState,
    pub states: Vec<LifecycleState>,
    pub terminal_states: Vec<LifecycleState>,
    pub transitions: Vec<EdgeDescription>,
}

/// A single legal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeDescription {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Legal edges of every governed entity type under a policy.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    policy: TransitionPolicy,
    edges: HashMap<LifecycleState, Vec<LifecycleState>>,
}

impl TransitionTable {
    /// Build the table for a policy.
    pub fn new(policy: TransitionPolicy) -> Self {
        let mut edges: HashMap<LifecycleState, Vec<LifecycleState>> = HashMap::new();
        for entity_type in EntityType::ALL {
            for state in entity_type.states() {
                edges.insert(state, state.standard_transitions());
            }
        }

        if policy.transaction_settlement == TransactionSettlement::Direct {
            for state in TransactionState::ALL {
                let shortcuts = state.direct_settlement_shortcuts();
                if shortcuts.is_empty() {
                    continue;
                }
                let next = edges
                    .entry(LifecycleState::Transaction(*state))
                    .or_default();
                next.extend(shortcuts.iter().copied().map(LifecycleState::Transaction));
            }
        }

        Self { policy, edges }
    }

    /// Table under the default policy.
    pub fn standard() -> Self {
        Self::new(TransitionPolicy::default())
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Legal next states from `from`. Empty for terminal states.
    pub fn legal_next_states(&self, from: LifecycleState) -> &[LifecycleState] {
        self.edges.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `from → to` is a legal edge.
    pub fn is_legal(&self, from: LifecycleState, to: LifecycleState) -> bool {
        from.entity_type() == to.entity_type() && self.legal_next_states(from).contains(&to)
    }

    /// Describe one entity type's machine under this table's policy.
    pub fn describe(&self, entity_type: EntityType) -> MachineDescription {
        let states = entity_type.states();
        let terminal_states = states.iter().copied().filter(|s| s.is_terminal()).collect();
        let transitions = states
            .iter()
            .flat_map(|from| {
                self.legal_next_states(*from)
                    .iter()
                    .map(move |to| EdgeDescription { from: *from, to: *to })
            })
            .collect();
        MachineDescription {
            entity_type,
            initial_state: entity_type.initial_state(),
            states,
            terminal_states,
            transitions,
        }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
