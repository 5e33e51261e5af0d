//! # Milestone Verification Lifecycle
//!
//! ```text
//! Planned ──▶ InProgress ──▶ PendingVerification ──▶ Approved (terminal)
//!                                     │
//!                                     └──▶ Rejected (terminal)
//! ```
//!
//! Approval of a milestone is what unlocks the escrow tranche tied to it.

lifecycle_states! {
    /// Delivery state of a project milestone.
    pub enum MilestoneState {
        /// Scheduled, work not started.
        Planned => "Planned",
        /// Work under way.
        InProgress => "InProgress",
        /// Deliverables submitted for admin verification.
        PendingVerification => "PendingVerification",
        /// Verified (terminal).
        Approved => "Approved",
        /// Verification failed (terminal).
        Rejected => "Rejected",
    }
}

impl MilestoneState {
    /// State every new milestone starts in.
    pub fn initial() -> Self {
        Self::Planned
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Whether entering this state requires a reason.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Legal next states.
    pub fn standard_transitions(&self) -> &'static [MilestoneState] {
        match self {
            Self::Planned => &[Self::InProgress],
            Self::InProgress => &[Self::PendingVerification],
            Self::PendingVerification => &[Self::Approved, Self::Rejected],
            Self::Approved | Self::Rejected => &[],
        }
    }
}
