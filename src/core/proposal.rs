use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Confirmations, EntryId, Evaluation, LifecycleEvent, Match, MatchOrigin, MatchStatus,
    MatchingPolicy, ReservationToken, Transition, WaitingEntry,
};
use crate::services::{EntryStore, NotificationDispatcher, StoreError};

/// Why a pair could not be reserved
#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Entry {0} was claimed by another writer")]
    FirstTaken(EntryId),

    #[error("Entry {0} was claimed by another writer")]
    SecondTaken(EntryId),

    #[error(transparent)]
    Store(StoreError),
}

/// Reserves two waiting entries under one token and records the resulting match.
///
/// Shared by the automatic matcher and the admin override path so both claim
/// entries through the same compare-and-set.
#[derive(Clone)]
pub struct Proposer {
    store: Arc<dyn EntryStore>,
    notifications: NotificationDispatcher,
    policy: Arc<MatchingPolicy>,
}

impl Proposer {
    pub fn new(
        store: Arc<dyn EntryStore>,
        notifications: NotificationDispatcher,
        policy: Arc<MatchingPolicy>,
    ) -> Self {
        Self {
            store,
            notifications,
            policy,
        }
    }

    pub async fn propose(
        &self,
        first: &WaitingEntry,
        second: &WaitingEntry,
        evaluation: &Evaluation,
        origin: MatchOrigin,
        now: DateTime<Utc>,
    ) -> Result<Match, ProposalError> {
        let token = ReservationToken::new();

        match self.store.transition(first.id, Transition::reserve(token)).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() || matches!(e, StoreError::NotFound(_)) => {
                return Err(ProposalError::FirstTaken(first.id));
            }
            Err(e) => return Err(ProposalError::Store(e)),
        }

        match self.store.transition(second.id, Transition::reserve(token)).await {
            Ok(_) => {}
            Err(e) => {
                self.release(first.id, token).await;
                return Err(if e.is_conflict() || matches!(e, StoreError::NotFound(_)) {
                    ProposalError::SecondTaken(second.id)
                } else {
                    ProposalError::Store(e)
                });
            }
        }

        let proposal = Match {
            id: Uuid::new_v4(),
            entry_a: first.id,
            entry_b: second.id,
            participant_a: first.participant_id.clone(),
            participant_b: second.participant_id.clone(),
            compatibility_score: evaluation.score,
            proposed_at: now,
            confirmation_deadline: now + self.policy.confirmation_window,
            confirmations: Confirmations::default(),
            status: MatchStatus::Proposed,
            meeting_details: None,
            reservation_token: token,
            overlap: evaluation.overlap,
            origin,
            resolution: None,
            resolved_at: None,
            version: 0,
        };

        if let Err(e) = self.store.insert_match(&proposal).await {
            tracing::error!("Failed to record match for {} and {}: {}", first.id, second.id, e);
            self.release(first.id, token).await;
            self.release(second.id, token).await;
            return Err(ProposalError::Store(e));
        }

        tracing::info!(
            "Proposed match {} between {} and {} (score {:.1}, deadline {})",
            proposal.id,
            proposal.entry_a,
            proposal.entry_b,
            proposal.compatibility_score,
            proposal.confirmation_deadline
        );

        let event = LifecycleEvent::MatchProposed {
            match_id: proposal.id,
            deadline: proposal.confirmation_deadline,
        };
        self.notifications.dispatch(&proposal.participant_a, event.clone());
        self.notifications.dispatch(&proposal.participant_b, event);

        Ok(proposal)
    }

    /// Undo a reservation this proposer made, restoring queue position and cooldown
    async fn release(&self, id: EntryId, token: ReservationToken) {
        if let Err(e) = self.store.transition(id, Transition::unreserve(token)).await {
            tracing::warn!("Failed to roll back reservation of {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgeRange, AvailabilityWindow, EntryState, Gender, GenderPreference, MeetingType,
        PaymentStatus, Preferences, Profile, VerificationStatus,
    };
    use crate::services::{LogNotifier, MemoryStore};
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn create_entry(participant: &str, gender: Gender) -> WaitingEntry {
        let now = Utc::now();
        WaitingEntry {
            id: Uuid::new_v4(),
            participant_id: participant.to_string(),
            profile: Profile { age: 30, gender },
            preferences: Preferences {
                age_range: AgeRange { min: 25, max: 35 },
                gender_preference: GenderPreference::Any,
                meeting_type: MeetingType::Drinks,
            },
            availability: vec![AvailabilityWindow::new(
                NaiveDate::from_ymd_opt(2025, 12, 28).unwrap(),
                NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            )],
            verification_status: VerificationStatus::Verified,
            payment_status: PaymentStatus::Paid,
            enqueued_at: now - Duration::hours(1),
            state: EntryState::Waiting,
            reservation_token: None,
            cooldown_until: None,
            updated_at: now,
            archived_at: None,
        }
    }

    fn evaluation() -> Evaluation {
        Evaluation {
            eligible: true,
            score: 80.0,
            reasons: Vec::new(),
            overlap: None,
        }
    }

    fn proposer(store: Arc<MemoryStore>) -> Proposer {
        Proposer::new(
            store,
            NotificationDispatcher::new(Arc::new(LogNotifier)),
            Arc::new(MatchingPolicy::default()),
        )
    }

    #[tokio::test]
    async fn test_lost_partner_rolls_back_first_entry_with_its_cooldown() {
        let store = Arc::new(MemoryStore::new());
        let mut cooling = create_entry("cooling", Gender::Female);
        let cooldown = Utc::now() + Duration::hours(20);
        cooling.cooldown_until = Some(cooldown);
        let partner = create_entry("partner", Gender::Male);
        store.enqueue(cooling.clone()).await.unwrap();
        store.enqueue(partner.clone()).await.unwrap();
        store
            .transition(partner.id, Transition::reserve(ReservationToken::new()))
            .await
            .unwrap();

        let origin = MatchOrigin::AdminOverride {
            justification: Some("requested".to_string()),
            waived_reasons: Vec::new(),
        };
        let err = proposer(store.clone())
            .propose(&cooling, &partner, &evaluation(), origin, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, ProposalError::SecondTaken(id) if id == partner.id));
        let after = store.get(cooling.id).await.unwrap().unwrap();
        assert_eq!(after.state, EntryState::Waiting);
        assert_eq!(after.reservation_token, None);
        assert_eq!(after.enqueued_at, cooling.enqueued_at);
        assert_eq!(after.cooldown_until, Some(cooldown));
    }

    #[tokio::test]
    async fn test_proposal_reserves_both_entries() {
        let store = Arc::new(MemoryStore::new());
        let first = create_entry("first", Gender::Female);
        let second = create_entry("second", Gender::Male);
        store.enqueue(first.clone()).await.unwrap();
        store.enqueue(second.clone()).await.unwrap();
        let now = Utc::now();

        let proposal = proposer(store.clone())
            .propose(&first, &second, &evaluation(), MatchOrigin::Automatic, now)
            .await
            .unwrap();

        assert_eq!(proposal.confirmation_deadline, now + Duration::hours(24));
        for id in [first.id, second.id] {
            let entry = store.get(id).await.unwrap().unwrap();
            assert_eq!(entry.state, EntryState::Proposed);
            assert_eq!(entry.reservation_token, Some(proposal.reservation_token));
        }
    }
}
