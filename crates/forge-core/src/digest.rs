//! # SHA-256 Digests
//!
//! Audit records are chained by SHA-256. Every field fed to the hash is
//! length-prefixed so that `("ab", "c")` and `("a", "bc")` never collide.

use sha2::{Digest, Sha256};

/// Digest that the first record of every chain links back to.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Incremental, field-framed SHA-256 builder.
#[derive(Clone, Default)]
pub struct Sha256Hex {
    hasher: Sha256,
}

impl Sha256Hex {
    /// Start an empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one length-prefixed field.
    pub fn field(mut self, value: &str) -> Self {
        self.hasher.update((value.len() as u64).to_be_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    /// Append an optional field; `None` hashes differently from `Some("")`.
    pub fn optional_field(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field("1").field(v),
            None => self.field("0"),
        }
    }

    /// Finish and render as lowercase hex.
    pub fn finish(self) -> String {
        self.hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl std::fmt::Debug for Sha256Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sha256Hex")
    }
}
