use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    EntryFilter, EntryId, EntryState, Match, MatchId, MatchStatus, MeetingOutcome,
    PaymentStatus, ReservationToken, ScheduledMeeting, Transition, VerificationStatus,
    WaitingEntry,
};

/// Errors that can occur in the entry store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict on entry {id}: expected {expected}, found {actual}")]
    Conflict {
        id: EntryId,
        expected: EntryState,
        actual: EntryState,
    },

    #[error("Match {0} was modified concurrently")]
    MatchConflict(MatchId),

    #[error("Participant {0} already has an active entry")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::MatchConflict(_))
    }
}

/// Durable record of entries, matches and scheduled meetings.
///
/// `transition` is the linearization point of the engine: every change of an
/// entry's `(state, reservation_token)` goes through it as a single
/// compare-and-set. A `Conflict` means another writer moved first and the
/// caller must re-read before deciding again.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Store a new entry. Rejects a second non-terminal entry for the same participant.
    async fn enqueue(&self, entry: WaitingEntry) -> Result<EntryId, StoreError>;

    async fn get(&self, id: EntryId) -> Result<Option<WaitingEntry>, StoreError>;

    /// Waiting entries matching `filter`, oldest `enqueued_at` first
    async fn list_waiting(&self, filter: &EntryFilter) -> Result<Vec<WaitingEntry>, StoreError>;

    async fn list_by_state(&self, state: EntryState) -> Result<Vec<WaitingEntry>, StoreError>;

    async fn transition(
        &self,
        id: EntryId,
        transition: Transition,
    ) -> Result<WaitingEntry, StoreError>;

    /// Update the verification/payment gates without touching the entry state
    async fn update_gates(
        &self,
        id: EntryId,
        verification: Option<VerificationStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<WaitingEntry, StoreError>;

    async fn insert_match(&self, record: &Match) -> Result<(), StoreError>;

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, StoreError>;

    async fn find_match_by_token(
        &self,
        token: ReservationToken,
    ) -> Result<Option<Match>, StoreError>;

    /// Replace a match if its stored version is still `expected_version`.
    /// The saved record carries the incremented version.
    async fn update_match(&self, record: &Match, expected_version: i64)
        -> Result<Match, StoreError>;

    async fn list_matches(&self, status: MatchStatus) -> Result<Vec<Match>, StoreError>;

    /// Insert a meeting unless one already exists for the match
    async fn insert_meeting(&self, meeting: &ScheduledMeeting) -> Result<ScheduledMeeting, StoreError>;

    async fn get_meeting(&self, match_id: MatchId) -> Result<Option<ScheduledMeeting>, StoreError>;

    /// Move a meeting out of `pending`, stamped `closed_at`. Conflicts if it
    /// was already closed.
    async fn close_meeting(
        &self,
        match_id: MatchId,
        outcome: MeetingOutcome,
        closed_at: DateTime<Utc>,
    ) -> Result<ScheduledMeeting, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}
