use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::evaluator::CompatibilityEvaluator;
use crate::core::proposal::{ProposalError, Proposer};
use crate::error::EngineError;
use crate::models::{EntryFilter, EntryId, Evaluation, Match, MatchOrigin, WaitingEntry};
use crate::services::EntryStore;

/// Result of ranking partners for one anchor entry
#[derive(Debug)]
pub struct RankedPartner<'a> {
    pub entry: &'a WaitingEntry,
    pub evaluation: Evaluation,
}

/// Main matching orchestrator - runs fair greedy passes over the waiting pool
///
/// # Pass Stages
/// 1. Snapshot eligible waiting entries, oldest first
/// 2. For each anchor, rank eligible partners by score
/// 3. Reserve the best pair with compare-and-set on both entries
/// 4. Record the match and notify both participants
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn EntryStore>,
    evaluator: CompatibilityEvaluator,
    proposer: Proposer,
}

impl Matcher {
    pub fn new(store: Arc<dyn EntryStore>, evaluator: CompatibilityEvaluator, proposer: Proposer) -> Self {
        Self {
            store,
            evaluator,
            proposer,
        }
    }

    pub fn evaluator(&self) -> &CompatibilityEvaluator {
        &self.evaluator
    }

    /// Eligible partners for `anchor` in preference order
    ///
    /// Order: highest score, then earliest `enqueued_at`, then id.
    pub fn rank_partners<'a>(
        &self,
        anchor: &WaitingEntry,
        pool: &'a [WaitingEntry],
        taken: &HashSet<EntryId>,
    ) -> Vec<RankedPartner<'a>> {
        let mut ranked: Vec<RankedPartner<'a>> = pool
            .iter()
            .filter(|candidate| candidate.id != anchor.id && !taken.contains(&candidate.id))
            .map(|candidate| RankedPartner {
                entry: candidate,
                evaluation: self.evaluator.evaluate(anchor, candidate),
            })
            .filter(|ranked| ranked.evaluation.eligible)
            .collect();

        ranked.sort_by(|a, b| {
            b.evaluation
                .score
                .partial_cmp(&a.evaluation.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.enqueued_at.cmp(&b.entry.enqueued_at))
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });

        ranked
    }

    pub async fn run_matching_pass(&self) -> Result<Vec<Match>, EngineError> {
        self.run_matching_pass_at(Utc::now()).await
    }

    /// Run one pass over the waiting pool as of `now`
    ///
    /// Entries claimed by a concurrent writer are skipped and never retried
    /// within the pass. Unmatched entries stay waiting for the next pass.
    pub async fn run_matching_pass_at(&self, now: DateTime<Utc>) -> Result<Vec<Match>, EngineError> {
        let snapshot: Vec<WaitingEntry> = self
            .store
            .list_waiting(&EntryFilter::eligible())
            .await?
            .into_iter()
            .filter(|entry| !entry.in_cooldown(now))
            .collect();

        tracing::debug!("Matching pass over {} waiting entries", snapshot.len());

        // Reserved by this pass, or lost to another writer
        let mut taken: HashSet<EntryId> = HashSet::new();
        let mut proposals = Vec::new();

        for anchor in &snapshot {
            if taken.contains(&anchor.id) {
                continue;
            }

            for partner in self.rank_partners(anchor, &snapshot, &taken) {
                match self
                    .proposer
                    .propose(anchor, partner.entry, &partner.evaluation, MatchOrigin::Automatic, now)
                    .await
                {
                    Ok(proposal) => {
                        taken.insert(anchor.id);
                        taken.insert(partner.entry.id);
                        proposals.push(proposal);
                        break;
                    }
                    Err(ProposalError::FirstTaken(id)) => {
                        tracing::debug!("Anchor {} claimed concurrently, skipping", id);
                        taken.insert(id);
                        break;
                    }
                    Err(ProposalError::SecondTaken(id)) => {
                        tracing::debug!("Partner {} claimed concurrently, trying next", id);
                        taken.insert(id);
                    }
                    Err(ProposalError::Store(e)) => return Err(e.into()),
                }
            }
        }

        tracing::info!(
            "Matching pass proposed {} matches from {} waiting entries",
            proposals.len(),
            snapshot.len()
        );

        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgeRange, AvailabilityWindow, EntryState, Gender, GenderPreference, MatchingPolicy,
        MeetingType, PaymentStatus, Preferences, Profile, VerificationStatus,
    };
    use crate::services::{LogNotifier, MemoryStore, NotificationDispatcher};
    use chrono::{Duration, NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn create_candidate(id: &str, age: u8, gender: Gender, preference: GenderPreference, minutes_ago: i64) -> WaitingEntry {
        let now = Utc::now();
        WaitingEntry {
            id: Uuid::new_v4(),
            participant_id: id.to_string(),
            profile: Profile { age, gender },
            preferences: Preferences {
                age_range: AgeRange { min: 21, max: 35 },
                gender_preference: preference,
                meeting_type: MeetingType::Drinks,
            },
            availability: vec![AvailabilityWindow::new(
                NaiveDate::from_ymd_opt(2025, 12, 28).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            )],
            verification_status: VerificationStatus::Verified,
            payment_status: PaymentStatus::Paid,
            enqueued_at: now - Duration::minutes(minutes_ago),
            state: EntryState::Waiting,
            reservation_token: None,
            cooldown_until: None,
            updated_at: now,
            archived_at: None,
        }
    }

    fn create_matcher(store: Arc<MemoryStore>) -> Matcher {
        let policy = Arc::new(MatchingPolicy::default());
        let notifications = NotificationDispatcher::new(Arc::new(LogNotifier));
        let proposer = Proposer::new(store.clone(), notifications, policy);
        Matcher::new(store, CompatibilityEvaluator::default(), proposer)
    }

    #[test]
    fn test_rank_partners_filters_ineligible() {
        let matcher = create_matcher(Arc::new(MemoryStore::new()));
        let anchor = create_candidate("anchor", 28, Gender::Female, GenderPreference::Male, 30);
        let pool = vec![
            anchor.clone(),
            create_candidate("1", 29, Gender::Male, GenderPreference::Female, 20), // Good match
            create_candidate("2", 40, Gender::Male, GenderPreference::Female, 20), // Too old
            create_candidate("3", 29, Gender::Female, GenderPreference::Female, 20), // Wrong gender
        ];

        let ranked = matcher.rank_partners(&anchor, &pool, &HashSet::new());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].entry.participant_id, "1");
    }

    #[test]
    fn test_rank_partners_breaks_ties_by_queue_age() {
        let matcher = create_matcher(Arc::new(MemoryStore::new()));
        let anchor = create_candidate("anchor", 28, Gender::Female, GenderPreference::Male, 60);
        // Equal distance in queue time from the anchor gives equal scores
        let pool = vec![
            create_candidate("later", 29, Gender::Male, GenderPreference::Female, 30),
            create_candidate("earlier", 29, Gender::Male, GenderPreference::Female, 90),
        ];

        let ranked = matcher.rank_partners(&anchor, &pool, &HashSet::new());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].evaluation.score, ranked[1].evaluation.score);
        assert_eq!(ranked[0].entry.participant_id, "earlier");
    }

    #[tokio::test]
    async fn test_pass_pairs_each_entry_once() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..3 {
            store
                .enqueue(create_candidate(&format!("f{}", i), 28, Gender::Female, GenderPreference::Male, 10 + i))
                .await
                .unwrap();
            store
                .enqueue(create_candidate(&format!("m{}", i), 30, Gender::Male, GenderPreference::Female, 10 + i))
                .await
                .unwrap();
        }
        let matcher = create_matcher(store.clone());

        let proposals = matcher.run_matching_pass().await.unwrap();

        assert_eq!(proposals.len(), 3);
        let mut seen = HashSet::new();
        for proposal in &proposals {
            assert!(seen.insert(proposal.entry_a));
            assert!(seen.insert(proposal.entry_b));
        }
        assert!(store.list_waiting(&EntryFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pass_skips_entries_in_cooldown() {
        let store = Arc::new(MemoryStore::new());
        let mut cooling = create_candidate("f", 28, Gender::Female, GenderPreference::Male, 10);
        cooling.cooldown_until = Some(Utc::now() + Duration::hours(2));
        store.enqueue(cooling).await.unwrap();
        store
            .enqueue(create_candidate("m", 30, Gender::Male, GenderPreference::Female, 5))
            .await
            .unwrap();
        let matcher = create_matcher(store.clone());

        assert!(matcher.run_matching_pass().await.unwrap().is_empty());

        let later = Utc::now() + Duration::hours(3);
        assert_eq!(matcher.run_matching_pass_at(later).await.unwrap().len(), 1);
    }
}
