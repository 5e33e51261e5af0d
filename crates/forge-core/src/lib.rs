//! # forge-core: Foundational Types for the Forge Lifecycle Service
//!
//! Every other crate in the workspace depends on `forge-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `EntityId`, `PrincipalId` and
//!    `TransitionId` are distinct types with validated constructors. A
//!    principal id cannot be passed where an entity id is expected.
//!
//! 2. **UTC-only timestamps.** [`Timestamp`] wraps `DateTime<Utc>` and keeps
//!    millisecond precision so audit records written in the same second still
//!    order correctly.
//!
//! 3. **One digest path.** Audit hash-chain digests are produced by the
//!    field-framed [`Sha256Hex`] builder only.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `forge-*` crates (leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use digest::{Sha256Hex, GENESIS_DIGEST};
pub use error::{ForgeError, ValidationError};
pub use identity::{EntityId, PrincipalId, TransitionId, SYSTEM_PRINCIPAL};
pub use temporal::Timestamp;
