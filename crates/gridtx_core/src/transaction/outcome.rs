//! Phase-two outcome classification.
//!
//! Each `commit`/`rollback` call made in phase two is reduced to an
//! [`Outcome`]; [`aggregate`] folds the outcomes of all participants into the
//! single result reported by the transaction.

use crate::resource::{ResourceErrorKind, ResourceResult};

/// Result of one phase-two participant call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call completed.
    Success,
    /// The participant had no record of the transaction; already resolved.
    NotApplicable,
    /// The participant heuristically committed.
    HeuristicCommit,
    /// The participant heuristically rolled back.
    HeuristicRollback,
    /// The participant partly committed and partly rolled back.
    HeuristicMixed,
    /// Any failure that is not a recognized protocol outcome.
    Unexpected,
}

impl Outcome {
    /// Classifies the result of a phase-two call.
    pub fn classify(result: &ResourceResult<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => match e.kind() {
                ResourceErrorKind::NotApplicable => Self::NotApplicable,
                ResourceErrorKind::HeuristicCommit => Self::HeuristicCommit,
                ResourceErrorKind::HeuristicRollback => Self::HeuristicRollback,
                ResourceErrorKind::HeuristicMixed => Self::HeuristicMixed,
                ResourceErrorKind::Rollback(_) | ResourceErrorKind::Unexpected => {
                    Self::Unexpected
                }
            },
        }
    }

    /// Returns true if the participant is resolved.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Success | Self::NotApplicable)
    }

    const fn is_heuristic(self) -> bool {
        matches!(
            self,
            Self::HeuristicCommit | Self::HeuristicRollback | Self::HeuristicMixed
        )
    }
}

/// Combined result of phase two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Every participant completed or was already resolved.
    Clean,
    /// Every participant failed heuristically in the same direction.
    HeuristicRollback,
    /// Participants disagree, or at least one failed unexpectedly.
    HeuristicMixed,
}

/// Folds phase-two outcomes into one [`Aggregate`].
///
/// - all resolved: [`Aggregate::Clean`]
/// - no resolved participant, no unexpected failure, and every failure is the
///   same heuristic commit or heuristic rollback: [`Aggregate::HeuristicRollback`]
/// - anything else: [`Aggregate::HeuristicMixed`]
#[must_use]
pub fn aggregate(outcomes: &[Outcome]) -> Aggregate {
    let mut resolved = false;
    let mut unexpected = false;
    let mut heuristic: Option<Outcome> = None;
    let mut disagree = false;

    for &outcome in outcomes {
        if outcome.is_resolved() {
            resolved = true;
        } else if outcome.is_heuristic() {
            match heuristic {
                None => heuristic = Some(outcome),
                Some(first) if first != outcome => disagree = true,
                Some(_) => {}
            }
        } else {
            unexpected = true;
        }
    }

    match heuristic {
        None if !unexpected => Aggregate::Clean,
        Some(kind) if !resolved && !unexpected && !disagree && kind != Outcome::HeuristicMixed => {
            Aggregate::HeuristicRollback
        }
        _ => Aggregate::HeuristicMixed,
    }
}
