//! Lume blind date engine - compatibility matching and queue lifecycle
//!
//! Participants join a waiting pool, the matcher pairs compatible entries in
//! queue order, and both parties confirm before a meeting is scheduled.
//! Every entry state change goes through a single compare-and-set on the
//! store, so concurrent passes, operator overrides and confirmations never
//! double-book an entry.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{CompatibilityEvaluator, ConfirmationOutcome, Engine, Matcher, SweepReport};
pub use error::EngineError;
pub use models::{
    EntryState, Evaluation, Match, MatchStatus, MatchingPolicy, ScoringWeights, WaitingEntry,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let policy = MatchingPolicy::default();
        let evaluator = CompatibilityEvaluator::from_policy(&policy, ScoringWeights::default());
        assert_eq!(evaluator.min_overlap().num_minutes(), 60);
    }
}
