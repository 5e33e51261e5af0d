//! # User Approval Lifecycle
//!
//! ```text
//! PendingApproval ──▶ Verified ──▶ Suspended (terminal)
//!        │
//!        └──▶ Rejected (terminal)
//! ```

lifecycle_states! {
    /// Account approval state of a platform user.
    pub enum UserState {
        /// Registered, awaiting admin KYC review.
        PendingApproval => "PendingApproval",
        /// Identity verified; the user can invest or submit projects.
        Verified => "Verified",
        /// Registration rejected (terminal).
        Rejected => "Rejected",
        /// Account suspended after verification (terminal).
        Suspended => "Suspended",
    }
}

impl UserState {
    /// State every newly registered user starts in.
    pub fn initial() -> Self {
        Self::PendingApproval
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Suspended)
    }

    /// Whether entering this state requires a reason.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Legal next states.
    pub fn standard_transitions(&self) -> &'static [UserState] {
        match self {
            Self::PendingApproval => &[Self::Verified, Self::Rejected],
            Self::Verified => &[Self::Suspended],
            Self::Rejected | Self::Suspended => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for state in UserState::ALL {
            assert_eq!(
                state.is_terminal(),
                state.standard_transitions().is_empty(),
                "{state}"
            );
        }
    }

    #[test]
    fn names_roundtrip() {
        for state in UserState::ALL {
            assert_eq!(UserState::parse(state.name()), Some(*state));
        }
        assert_eq!(UserState::parse("pendingapproval"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&UserState::PendingApproval).unwrap();
        assert_eq!(json, "\"PendingApproval\"");
    }
}
