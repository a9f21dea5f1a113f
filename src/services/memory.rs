use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::models::{
    EntryFilter, EntryId, EntryState, Match, MatchId, MatchStatus, MeetingOutcome,
    PaymentStatus, ReservationToken, ScheduledMeeting, Transition, VerificationStatus,
    WaitingEntry,
};
use crate::services::store::{EntryStore, StoreError};

#[derive(Default)]
struct Tables {
    entries: HashMap<EntryId, WaitingEntry>,
    matches: HashMap<MatchId, Match>,
    meetings: HashMap<MatchId, ScheduledMeeting>,
}

/// In-process entry store.
///
/// All tables sit behind one async mutex, so each operation, including the
/// compare-and-set in `transition`, is atomic with respect to every other.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_queue_order(mut entries: Vec<WaitingEntry>) -> Vec<WaitingEntry> {
    entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then_with(|| a.id.cmp(&b.id)));
    entries
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn enqueue(&self, entry: WaitingEntry) -> Result<EntryId, StoreError> {
        let mut tables = self.tables.lock().await;

        let duplicate = tables
            .entries
            .values()
            .any(|e| e.participant_id == entry.participant_id && !e.state.is_terminal());
        if duplicate {
            return Err(StoreError::Duplicate(entry.participant_id));
        }

        let id = entry.id;
        tables.entries.insert(id, entry);
        Ok(id)
    }

    async fn get(&self, id: EntryId) -> Result<Option<WaitingEntry>, StoreError> {
        Ok(self.tables.lock().await.entries.get(&id).cloned())
    }

    async fn list_waiting(&self, filter: &EntryFilter) -> Result<Vec<WaitingEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let waiting = tables
            .entries
            .values()
            .filter(|e| e.state == EntryState::Waiting && filter.matches(e))
            .cloned()
            .collect();
        Ok(sorted_by_queue_order(waiting))
    }

    async fn list_by_state(&self, state: EntryState) -> Result<Vec<WaitingEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let entries = tables
            .entries
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect();
        Ok(sorted_by_queue_order(entries))
    }

    async fn transition(
        &self,
        id: EntryId,
        transition: Transition,
    ) -> Result<WaitingEntry, StoreError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("entry {}", id)))?;

        if entry.state != transition.expected_state
            || entry.reservation_token != transition.expected_token
        {
            return Err(StoreError::Conflict {
                id,
                expected: transition.expected_state,
                actual: entry.state,
            });
        }

        let now = Utc::now();
        entry.state = transition.new_state;
        entry.reservation_token = transition.new_token;
        if !transition.keep_cooldown {
            entry.cooldown_until = transition.cooldown_until;
        }
        entry.updated_at = now;
        if transition.new_state.is_terminal() {
            entry.archived_at = Some(now);
        }

        Ok(entry.clone())
    }

    async fn update_gates(
        &self,
        id: EntryId,
        verification: Option<VerificationStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<WaitingEntry, StoreError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("entry {}", id)))?;

        if let Some(status) = verification {
            entry.verification_status = status;
        }
        if let Some(status) = payment {
            entry.payment_status = status;
        }
        entry.updated_at = Utc::now();

        Ok(entry.clone())
    }

    async fn insert_match(&self, record: &Match) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.matches.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.tables.lock().await.matches.get(&id).cloned())
    }

    async fn find_match_by_token(
        &self,
        token: ReservationToken,
    ) -> Result<Option<Match>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .matches
            .values()
            .find(|m| m.reservation_token == token)
            .cloned())
    }

    async fn update_match(
        &self,
        record: &Match,
        expected_version: i64,
    ) -> Result<Match, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .matches
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::NotFound(format!("match {}", record.id)))?;

        if stored.version != expected_version {
            return Err(StoreError::MatchConflict(record.id));
        }

        let mut saved = record.clone();
        saved.version = expected_version + 1;
        *stored = saved.clone();
        Ok(saved)
    }

    async fn list_matches(&self, status: MatchStatus) -> Result<Vec<Match>, StoreError> {
        let tables = self.tables.lock().await;
        let mut matches: Vec<Match> = tables
            .matches
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.proposed_at.cmp(&b.proposed_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn insert_meeting(
        &self,
        meeting: &ScheduledMeeting,
    ) -> Result<ScheduledMeeting, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .meetings
            .entry(meeting.match_id)
            .or_insert_with(|| meeting.clone())
            .clone())
    }

    async fn get_meeting(&self, match_id: MatchId) -> Result<Option<ScheduledMeeting>, StoreError> {
        Ok(self.tables.lock().await.meetings.get(&match_id).cloned())
    }

    async fn close_meeting(
        &self,
        match_id: MatchId,
        outcome: MeetingOutcome,
        closed_at: DateTime<Utc>,
    ) -> Result<ScheduledMeeting, StoreError> {
        let mut tables = self.tables.lock().await;
        let meeting = tables
            .meetings
            .get_mut(&match_id)
            .ok_or_else(|| StoreError::NotFound(format!("meeting for match {}", match_id)))?;

        if meeting.outcome != MeetingOutcome::Pending {
            return Err(StoreError::MatchConflict(match_id));
        }

        meeting.outcome = outcome;
        meeting.closed_at = Some(closed_at);
        Ok(meeting.clone())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}
