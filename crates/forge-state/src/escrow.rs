//! # Escrow Account Lifecycle
//!
//! Investor funds sit in escrow until the milestone they back is approved
//! (`Released` to the innovator) or the project fails (`Refunded` to the
//! investor). Both outcomes are final.

lifecycle_states! {
    /// Custody state of an escrow account.
    pub enum EscrowState {
        /// Funds held.
        Locked => "Locked",
        /// Funds paid out to the project (terminal).
        Released => "Released",
        /// Funds returned to the investor (terminal).
        Refunded => "Refunded",
    }
}

impl EscrowState {
    /// State every new escrow account starts in.
    pub fn initial() -> Self {
        Self::Locked
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Locked)
    }

    /// Refunds need a recorded justification.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Refunded)
    }

    /// Legal next states.
    pub fn standard_transitions(&self) -> &'static [EscrowState] {
        match self {
            Self::Locked => &[Self::Released, Self::Refunded],
            Self::Released | Self::Refunded => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_is_the_only_live_state() {
        assert!(!EscrowState::Locked.is_terminal());
        assert!(EscrowState::Released.is_terminal());
        assert!(EscrowState::Refunded.is_terminal());
    }

    #[test]
    fn refund_requires_reason_release_does_not() {
        assert!(EscrowState::Refunded.is_rejection());
        assert!(!EscrowState::Released.is_rejection());
    }
}
