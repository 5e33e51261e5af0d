//! # Wallet Transaction Lifecycle
//!
//! Deposits and withdrawals go through admin verification:
//!
//! ```text
//! pending ──▶ verifying ──▶ completed (terminal)
//!                 │
//!                 └──▶ rejected (terminal)
//! ```
//!
//! Legacy admin data also settles transactions straight from `pending`.
//! Those shortcut edges are not part of the standard machine; they are added
//! by [`TransactionSettlement::Direct`](crate::TransactionSettlement::Direct).
//!
//! Wire names are lowercase, matching the payment backend.

lifecycle_states! {
    /// Settlement state of a wallet transaction.
    pub enum TransactionState {
        /// Submitted by the user.
        Pending => "pending",
        /// Under admin verification.
        Verifying => "verifying",
        /// Settled (terminal).
        Completed => "completed",
        /// Declined (terminal).
        Rejected => "rejected",
    }
}

impl TransactionState {
    /// State every new transaction starts in.
    pub fn initial() -> Self {
        Self::Pending
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Whether entering this state requires a reason.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Legal next states under staged settlement.
    pub fn standard_transitions(&self) -> &'static [TransactionState] {
        match self {
            Self::Pending => &[Self::Verifying],
            Self::Verifying => &[Self::Completed, Self::Rejected],
            Self::Completed | Self::Rejected => &[],
        }
    }

    /// Extra edges enabled by direct settlement.
    pub fn direct_settlement_shortcuts(&self) -> &'static [TransactionState] {
        match self {
            Self::Pending => &[Self::Completed, Self::Rejected],
            _ => &[],
        }
    }
}
