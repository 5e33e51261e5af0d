//! # History Walk Validation
//!
//! A sequence of `(from, to)` steps is a valid walk when every step starts
//! where the previous one ended (the first step starts at the entity's
//! registered state) and every step is a legal edge of the table.

use thiserror::Error;

use crate::machine::{LifecycleState, TransitionTable};

/// Why a sequence of steps is not a valid walk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    /// Step does not start where the previous step ended.
    #[error("step {index}: expected from-state {expected}, found {found}")]
    Discontinuity {
        index: usize,
        expected: LifecycleState,
        found: LifecycleState,
    },

    /// Step is not a legal edge.
    #[error("step {index}: {from} -> {to} is not a legal transition")]
    IllegalEdge {
        index: usize,
        from: LifecycleState,
        to: LifecycleState,
    },
}

impl WalkError {
    /// Zero-based index of the offending step.
    pub fn index(&self) -> usize {
        match self {
            Self::Discontinuity { index, .. } | Self::IllegalEdge { index, .. } => *index,
        }
    }
}

/// Check that `steps` is a walk through `table` starting at `start`.
///
/// Returns the state the walk ends in.
pub fn validate_walk<I>(
    table: &TransitionTable,
    start: LifecycleState,
    steps: I,
) -> Result<LifecycleState, WalkError>
where
    I: IntoIterator<Item = (LifecycleState, LifecycleState)>,
{
    let mut current = start;
    for (index, (from, to)) in steps.into_iter().enumerate() {
        if from != current {
            return Err(WalkError::Discontinuity {
                index,
                expected: current,
                found: from,
            });
        }
        if !table.is_legal(from, to) {
            return Err(WalkError::IllegalEdge { index, from, to });
        }
        current = to;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityType, MilestoneState};

    fn m(s: MilestoneState) -> LifecycleState {
        LifecycleState::Milestone(s)
    }

    #[test]
    fn empty_walk_ends_at_start() {
        let table = TransitionTable::standard();
        let start = EntityType::Milestone.initial_state();
        assert_eq!(validate_walk(&table, start, []), Ok(start));
    }

    #[test]
    fn full_milestone_walk() {
        use MilestoneState::*;
        let table = TransitionTable::standard();
        let steps = [
            (m(Planned), m(InProgress)),
            (m(InProgress), m(PendingVerification)),
            (m(PendingVerification), m(Approved)),
        ];
        assert_eq!(validate_walk(&table, m(Planned), steps), Ok(m(Approved)));
    }

    #[test]
    fn gap_is_a_discontinuity() {
        use MilestoneState::*;
        let table = TransitionTable::standard();
        let steps = [
            (m(Planned), m(InProgress)),
            (m(PendingVerification), m(Approved)),
        ];
        let err = validate_walk(&table, m(Planned), steps).unwrap_err();
        assert_eq!(
            err,
            WalkError::Discontinuity {
                index: 1,
                expected: m(InProgress),
                found: m(PendingVerification),
            }
        );
        assert_eq!(err.index(), 1);
    }

    #[test]
    fn skipped_state_is_illegal() {
        use MilestoneState::*;
        let table = TransitionTable::standard();
        let err = validate_walk(&table, m(Planned), [(m(Planned), m(Approved))]).unwrap_err();
        assert!(matches!(err, WalkError::IllegalEdge { index: 0, .. }));
    }
}
