//! Property-based test generators using proptest.
//!
//! Provides strategies for identifiers, completion outcomes and scripted
//! participant behavior.

use crate::fixtures::{CallLog, MockResource};
use gridtx_core::{Outcome, ResourceErrorKind, Vote, Xid, ROLLBACK_CODE_BASE, ROLLBACK_CODE_END};
use proptest::prelude::*;

/// Strategy for valid global transaction id bytes (1 to 64 bytes).
pub fn gtrid_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=64)
}

/// Strategy for valid transaction identifiers.
pub fn xid_strategy() -> impl Strategy<Value = Xid> {
    (any::<i32>(), gtrid_strategy())
        .prop_filter_map("identifier must be valid", |(format_id, gtrid)| {
            Xid::new(format_id, gtrid).ok()
        })
}

/// Strategy for rollback error codes.
pub fn rollback_code_strategy() -> impl Strategy<Value = i32> {
    ROLLBACK_CODE_BASE..=ROLLBACK_CODE_END
}

/// Strategy for every resource error kind.
pub fn resource_error_kind_strategy() -> impl Strategy<Value = ResourceErrorKind> {
    prop_oneof![
        rollback_code_strategy().prop_map(ResourceErrorKind::Rollback),
        Just(ResourceErrorKind::HeuristicCommit),
        Just(ResourceErrorKind::HeuristicRollback),
        Just(ResourceErrorKind::HeuristicMixed),
        Just(ResourceErrorKind::NotApplicable),
        Just(ResourceErrorKind::Unexpected),
    ]
}

/// Strategy for a single participant's completion outcome.
pub fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Success),
        Just(Outcome::NotApplicable),
        Just(Outcome::HeuristicCommit),
        Just(Outcome::HeuristicRollback),
        Just(Outcome::HeuristicMixed),
        Just(Outcome::Unexpected),
    ]
}

/// How a scripted participant behaves during two-phase commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantBehavior {
    /// Votes commit and commits.
    Commits,
    /// Votes read-only.
    ReadOnly,
    /// Vetoes the prepare with a rollback code.
    VetoesPrepare(i32),
    /// Fails the prepare with an unexpected error.
    BreaksPrepare,
    /// Votes commit, then fails the second phase with the given kind.
    FailsCommit(ResourceErrorKind),
}

impl ParticipantBehavior {
    /// Returns true if this participant aborts the prepare phase.
    pub fn aborts_prepare(self) -> bool {
        matches!(self, Self::VetoesPrepare(_) | Self::BreaksPrepare)
    }

    /// Builds a mock resource following this behavior.
    pub fn into_mock(self, name: impl Into<String>, log: &CallLog) -> MockResource {
        let mock = MockResource::new(name, log);
        match self {
            Self::Commits => mock,
            Self::ReadOnly => mock.vote(Vote::ReadOnly),
            Self::VetoesPrepare(code) => mock.fail_prepare(ResourceErrorKind::Rollback(code)),
            Self::BreaksPrepare => mock.fail_prepare(ResourceErrorKind::Unexpected),
            Self::FailsCommit(kind) => mock.fail_commit(kind),
        }
    }
}

/// Strategy for participants that never fail.
pub fn healthy_behavior_strategy() -> impl Strategy<Value = ParticipantBehavior> {
    prop_oneof![
        3 => Just(ParticipantBehavior::Commits),
        1 => Just(ParticipantBehavior::ReadOnly),
    ]
}

/// Strategy for any participant behavior.
pub fn behavior_strategy() -> impl Strategy<Value = ParticipantBehavior> {
    prop_oneof![
        4 => healthy_behavior_strategy(),
        1 => rollback_code_strategy().prop_map(ParticipantBehavior::VetoesPrepare),
        1 => Just(ParticipantBehavior::BreaksPrepare),
        1 => resource_error_kind_strategy()
            .prop_filter("second phase failures are not rollback codes", |k| {
                !k.is_rollback()
            })
            .prop_map(ParticipantBehavior::FailsCommit),
    ]
}

/// Strategy for the participants of one transaction.
pub fn transaction_script_strategy(
    max_participants: usize,
) -> impl Strategy<Value = Vec<ParticipantBehavior>> {
    prop::collection::vec(behavior_strategy(), 0..=max_participants)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
