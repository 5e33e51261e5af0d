//! # API Route Modules
//!
//! - `transitions`: transition requests, batch requests, audit history and
//!   history verification.
//! - `entities`: registration and lookup of governed entities.
//! - `machines`: read-only view of the active transition table.
//! - `metrics`: Prometheus text counters.

pub mod entities;
pub mod machines;
pub mod metrics;
pub mod transitions;
