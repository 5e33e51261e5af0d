//! # forge-state: Governed Entity State Machines
//!
//! Each governed entity type has its own closed set of approval states and a
//! fixed set of legal edges between them:
//!
//! - **User** (`user.rs`): `PendingApproval → Verified | Rejected`, `Verified → Suspended`.
//! - **Project** (`project.rs`): approval, funding progression, delivery.
//! - **Milestone** (`milestone.rs`): `Planned → InProgress → PendingVerification → Approved | Rejected`.
//! - **EscrowAccount** (`escrow.rs`): `Locked → Released | Refunded`.
//! - **Transaction** (`transaction.rs`): `pending → verifying → completed | rejected`.
//!
//! ## Design
//!
//! Unlike typestate machines, governed entities arrive over the wire with
//! their state as a string, so states are runtime enums. The boundary parses
//! strings into [`LifecycleState`] exactly once: an unknown name is a
//! validation error, never a silently-stored string. Legality of an edge is
//! answered only by [`TransitionTable`], which is built from the per-type
//! standard edges plus the configured [`TransitionPolicy`].

/// Declare a per-entity-type state enum with its canonical wire names.
macro_rules! lifecycle_states {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant, )+
        }

        impl $name {
            /// Every state of this machine, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical wire name.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }

            /// Parse a canonical wire name. Matching is exact.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $wire => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

pub mod escrow;
pub mod machine;
pub mod milestone;
pub mod project;
pub mod transaction;
pub mod user;
pub mod walk;

pub use escrow::EscrowState;
pub use machine::{
    EdgeDescription, EntityType, LifecycleState, MachineDescription, TransactionSettlement,
    TransitionPolicy, TransitionTable,
};
pub use milestone::MilestoneState;
pub use project::ProjectState;
pub use transaction::TransactionState;
pub use user::UserState;
pub use walk::{validate_walk, WalkError};
