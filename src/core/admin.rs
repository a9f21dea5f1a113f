use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::evaluator::CompatibilityEvaluator;
use crate::core::proposal::{ProposalError, Proposer};
use crate::error::{EngineError, Result};
use crate::models::{
    EntryFilter, EntryId, EntryState, Match, MatchOrigin, MatchStatus, WaitingEntry,
};
use crate::services::EntryStore;

/// Operator surface over the waiting pool
///
/// A forced match goes through the same reservation as the automatic pass,
/// so it can never claim an entry the matcher already holds.
#[derive(Clone)]
pub struct AdminGateway {
    store: Arc<dyn EntryStore>,
    evaluator: CompatibilityEvaluator,
    proposer: Proposer,
}

impl AdminGateway {
    pub fn new(store: Arc<dyn EntryStore>, evaluator: CompatibilityEvaluator, proposer: Proposer) -> Self {
        Self {
            store,
            evaluator,
            proposer,
        }
    }

    pub async fn list_waiting(&self, filter: &EntryFilter) -> Result<Vec<WaitingEntry>> {
        Ok(self.store.list_waiting(filter).await?)
    }

    pub async fn list_by_status(&self, status: MatchStatus) -> Result<Vec<Match>> {
        Ok(self.store.list_matches(status).await?)
    }

    pub async fn force_match(
        &self,
        a: EntryId,
        b: EntryId,
        justification: Option<String>,
    ) -> Result<Match> {
        self.force_match_at(a, b, justification, Utc::now()).await
    }

    /// Propose a match between two waiting entries chosen by an operator
    ///
    /// An ineligible pair is only accepted with a non-empty justification;
    /// the waived reasons are kept on the match.
    pub async fn force_match_at(
        &self,
        a: EntryId,
        b: EntryId,
        justification: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        let (entry_a, entry_b) = self.load_pair(a, b).await?;

        for entry in [&entry_a, &entry_b] {
            if entry.state != EntryState::Waiting {
                return Err(EngineError::Conflict(format!(
                    "entry {} is {}, not waiting",
                    entry.id, entry.state
                )));
            }
        }

        let evaluation = self.evaluator.evaluate(&entry_a, &entry_b);
        let justification = justification
            .map(|j| j.trim().to_string())
            .filter(|j| !j.is_empty());

        if !evaluation.eligible && justification.is_none() {
            return Err(EngineError::Ineligible {
                reasons: evaluation.reasons,
            });
        }

        let waived_reasons = if evaluation.eligible {
            Vec::new()
        } else {
            evaluation.reasons.clone()
        };
        if !waived_reasons.is_empty() {
            tracing::warn!(
                "Forcing ineligible pair {} and {}, waiving: {}",
                a,
                b,
                waived_reasons.join("; ")
            );
        }

        let origin = MatchOrigin::AdminOverride {
            justification,
            waived_reasons,
        };

        match self.proposer.propose(&entry_a, &entry_b, &evaluation, origin, now).await {
            Ok(proposal) => Ok(proposal),
            Err(ProposalError::FirstTaken(id)) | Err(ProposalError::SecondTaken(id)) => Err(
                EngineError::Conflict(format!("entry {} was claimed concurrently", id)),
            ),
            Err(ProposalError::Store(e)) => Err(e.into()),
        }
    }

    async fn load_pair(&self, a: EntryId, b: EntryId) -> Result<(WaitingEntry, WaitingEntry)> {
        if a == b {
            return Err(EngineError::Validation(
                "an entry cannot be matched with itself".to_string(),
            ));
        }

        let entry_a = self
            .store
            .get(a)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("entry {}", a)))?;
        let entry_b = self
            .store
            .get(b)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("entry {}", b)))?;

        Ok((entry_a, entry_b))
    }
}
