//! # Project Lifecycle
//!
//! ```text
//! PendingApproval ──▶ SeekingFunding ──▶ PartiallyFunded ──▶ FullyFunded
//!        │                                      │                 │
//!        └──▶ Rejected (terminal)               └──▶ InProgress ◀─┘
//!                                                        │
//!                                                        ▼
//!                                                 Completed (terminal)
//! ```
//!
//! Delivery can start once any funding has arrived. There is no edge from
//! `SeekingFunding` straight to `FullyFunded`.

lifecycle_states! {
    /// Approval and funding state of an innovator's project.
    pub enum ProjectState {
        /// Submitted, awaiting admin review.
        PendingApproval => "PendingApproval",
        /// Approved and open for investment.
        SeekingFunding => "SeekingFunding",
        /// At least one investment received.
        PartiallyFunded => "PartiallyFunded",
        /// Funding goal reached.
        FullyFunded => "FullyFunded",
        /// Delivery under way.
        InProgress => "InProgress",
        /// All milestones delivered (terminal).
        Completed => "Completed",
        /// Submission rejected (terminal).
        Rejected => "Rejected",
    }
}

impl ProjectState {
    /// State every newly submitted project starts in.
    pub fn initial() -> Self {
        Self::PendingApproval
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Whether entering this state requires a reason.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Whether the project has received any funding.
    pub fn is_funded(&self) -> bool {
        matches!(self, Self::PartiallyFunded | Self::FullyFunded)
    }

    /// Legal next states.
    pub fn standard_transitions(&self) -> &'static [ProjectState] {
        match self {
            Self::PendingApproval => &[Self::SeekingFunding, Self::Rejected],
            Self::SeekingFunding => &[Self::PartiallyFunded],
            Self::PartiallyFunded => &[Self::FullyFunded, Self::InProgress],
            Self::FullyFunded => &[Self::InProgress],
            Self::InProgress => &[Self::Completed],
            Self::Completed | Self::Rejected => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funded_states_lead_to_delivery() {
        for state in ProjectState::ALL.iter().filter(|s| s.is_funded()) {
            assert!(state
                .standard_transitions()
                .contains(&ProjectState::InProgress));
        }
    }

    #[test]
    fn seeking_funding_cannot_jump_to_fully_funded() {
        assert!(!ProjectState::SeekingFunding
            .standard_transitions()
            .contains(&ProjectState::FullyFunded));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for state in ProjectState::ALL {
            assert_eq!(state.is_terminal(), state.standard_transitions().is_empty());
        }
    }
}
