// Core engine exports
pub mod admin;
pub mod availability;
pub mod coordinator;
pub mod engine;
pub mod evaluator;
pub mod filters;
pub mod intake;
pub mod matcher;
pub mod proposal;
pub mod scoring;

pub use admin::AdminGateway;
pub use availability::{best_overlap, is_valid_window, window_overlap};
pub use coordinator::{ConfirmationCoordinator, ConfirmationOutcome, SweepReport};
pub use engine::{Collaborators, Engine};
pub use evaluator::CompatibilityEvaluator;
pub use filters::{demographic_reasons, gate_reasons, matches_demographics, meeting_type_reason};
pub use intake::Intake;
pub use matcher::{Matcher, RankedPartner};
pub use proposal::{ProposalError, Proposer};
pub use scoring::calculate_match_score;
