use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{
    EntryFilter, EntryId, EntryState, Match, MatchId, MatchStatus, MeetingOutcome,
    PaymentStatus, ReservationToken, ScheduledMeeting, Transition, VerificationStatus,
    WaitingEntry,
};
use crate::services::store::{EntryStore, StoreError};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed entry store
///
/// Entry transitions are a single conditional `UPDATE ... RETURNING`, so the
/// compare-and-set on `(state, reservation_token)` is enforced by the
/// database row lock rather than by the caller.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL entry store");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    async fn current_state(&self, id: EntryId) -> Result<Option<EntryState>, StoreError> {
        let row = sqlx::query("SELECT state FROM waiting_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| parse_label::<EntryState>(r.try_get("state")?))
            .transpose()
    }

    async fn match_exists(&self, id: MatchId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn parse_label<T>(value: String) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn entry_from_row(row: &PgRow) -> Result<WaitingEntry, StoreError> {
    Ok(WaitingEntry {
        id: row.try_get("id")?,
        participant_id: row.try_get("participant_id")?,
        profile: row.try_get::<Json<_>, _>("profile")?.0,
        preferences: row.try_get::<Json<_>, _>("preferences")?.0,
        availability: row.try_get::<Json<_>, _>("availability")?.0,
        verification_status: parse_label(row.try_get("verification_status")?)?,
        payment_status: parse_label(row.try_get("payment_status")?)?,
        enqueued_at: row.try_get("enqueued_at")?,
        state: parse_label(row.try_get("state")?)?,
        reservation_token: row
            .try_get::<Option<uuid::Uuid>, _>("reservation_token")?
            .map(ReservationToken),
        cooldown_until: row.try_get("cooldown_until")?,
        updated_at: row.try_get("updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, StoreError> {
    Ok(Match {
        id: row.try_get("id")?,
        entry_a: row.try_get("entry_a")?,
        entry_b: row.try_get("entry_b")?,
        participant_a: row.try_get("participant_a")?,
        participant_b: row.try_get("participant_b")?,
        compatibility_score: row.try_get("compatibility_score")?,
        proposed_at: row.try_get("proposed_at")?,
        confirmation_deadline: row.try_get("confirmation_deadline")?,
        confirmations: row.try_get::<Json<_>, _>("confirmations")?.0,
        status: parse_label(row.try_get("status")?)?,
        meeting_details: row
            .try_get::<Option<Json<_>>, _>("meeting_details")?
            .map(|j| j.0),
        reservation_token: ReservationToken(row.try_get("reservation_token")?),
        overlap: row.try_get::<Option<Json<_>>, _>("overlap")?.map(|j| j.0),
        origin: row.try_get::<Json<_>, _>("origin")?.0,
        resolution: row.try_get::<Option<Json<_>>, _>("resolution")?.map(|j| j.0),
        resolved_at: row.try_get("resolved_at")?,
        version: row.try_get("version")?,
    })
}

fn meeting_from_row(row: &PgRow) -> Result<ScheduledMeeting, StoreError> {
    Ok(ScheduledMeeting {
        match_id: row.try_get("match_id")?,
        entry_a: row.try_get("entry_a")?,
        entry_b: row.try_get("entry_b")?,
        date: row.try_get("meeting_date")?,
        start: row.try_get("start_time")?,
        end: row.try_get("end_time")?,
        location: row.try_get("location")?,
        meeting_type: parse_label(row.try_get("meeting_type")?)?,
        outcome: parse_label(row.try_get("outcome")?)?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

#[async_trait]
impl EntryStore for PostgresStore {
    async fn enqueue(&self, entry: WaitingEntry) -> Result<EntryId, StoreError> {
        let query = r#"
            INSERT INTO waiting_entries (
                id, participant_id, profile, preferences, availability,
                verification_status, payment_status, enqueued_at, state,
                reservation_token, cooldown_until, updated_at, archived_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#;

        let result = sqlx::query(query)
            .bind(entry.id)
            .bind(&entry.participant_id)
            .bind(Json(&entry.profile))
            .bind(Json(&entry.preferences))
            .bind(Json(&entry.availability))
            .bind(entry.verification_status.as_str())
            .bind(entry.payment_status.as_str())
            .bind(entry.enqueued_at)
            .bind(entry.state.as_str())
            .bind(entry.reservation_token.map(|t| t.0))
            .bind(entry.cooldown_until)
            .bind(entry.updated_at)
            .bind(entry.archived_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                tracing::debug!("Enqueued entry {} for {}", entry.id, entry.participant_id);
                Ok(entry.id)
            }
            Err(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Duplicate(entry.participant_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: EntryId) -> Result<Option<WaitingEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM waiting_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_waiting(&self, filter: &EntryFilter) -> Result<Vec<WaitingEntry>, StoreError> {
        let entries = self.list_by_state(EntryState::Waiting).await?;
        Ok(entries.into_iter().filter(|e| filter.matches(e)).collect())
    }

    async fn list_by_state(&self, state: EntryState) -> Result<Vec<WaitingEntry>, StoreError> {
        let query = r#"
            SELECT *
            FROM waiting_entries
            WHERE state = $1
            ORDER BY enqueued_at ASC, id ASC
        "#;

        let rows = sqlx::query(query)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn transition(
        &self,
        id: EntryId,
        transition: Transition,
    ) -> Result<WaitingEntry, StoreError> {
        let query = r#"
            UPDATE waiting_entries
            SET state = $1,
                reservation_token = $2,
                cooldown_until = CASE WHEN $8 THEN cooldown_until ELSE $3 END,
                updated_at = NOW(),
                archived_at = CASE WHEN $4 THEN NOW() ELSE archived_at END
            WHERE id = $5
              AND state = $6
              AND reservation_token IS NOT DISTINCT FROM $7
            RETURNING *
        "#;

        let row = sqlx::query(query)
            .bind(transition.new_state.as_str())
            .bind(transition.new_token.map(|t| t.0))
            .bind(transition.cooldown_until)
            .bind(transition.new_state.is_terminal())
            .bind(id)
            .bind(transition.expected_state.as_str())
            .bind(transition.expected_token.map(|t| t.0))
            .bind(transition.keep_cooldown)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => entry_from_row(&row),
            None => match self.current_state(id).await? {
                Some(actual) => Err(StoreError::Conflict {
                    id,
                    expected: transition.expected_state,
                    actual,
                }),
                None => Err(StoreError::NotFound(format!("entry {}", id))),
            },
        }
    }

    async fn update_gates(
        &self,
        id: EntryId,
        verification: Option<VerificationStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<WaitingEntry, StoreError> {
        let query = r#"
            UPDATE waiting_entries
            SET verification_status = COALESCE($1, verification_status),
                payment_status = COALESCE($2, payment_status),
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
        "#;

        let row = sqlx::query(query)
            .bind(verification.map(|s| s.as_str()))
            .bind(payment.map(|s| s.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => entry_from_row(&row),
            None => Err(StoreError::NotFound(format!("entry {}", id))),
        }
    }

    async fn insert_match(&self, record: &Match) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO matches (
                id, entry_a, entry_b, participant_a, participant_b,
                compatibility_score, proposed_at, confirmation_deadline,
                confirmations, status, meeting_details, reservation_token,
                overlap, origin, resolution, resolved_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#;

        sqlx::query(query)
            .bind(record.id)
            .bind(record.entry_a)
            .bind(record.entry_b)
            .bind(&record.participant_a)
            .bind(&record.participant_b)
            .bind(record.compatibility_score)
            .bind(record.proposed_at)
            .bind(record.confirmation_deadline)
            .bind(Json(&record.confirmations))
            .bind(record.status.as_str())
            .bind(record.meeting_details.as_ref().map(Json))
            .bind(record.reservation_token.0)
            .bind(record.overlap.as_ref().map(Json))
            .bind(Json(&record.origin))
            .bind(record.resolution.as_ref().map(Json))
            .bind(record.resolved_at)
            .bind(record.version)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn find_match_by_token(
        &self,
        token: ReservationToken,
    ) -> Result<Option<Match>, StoreError> {
        let row = sqlx::query("SELECT * FROM matches WHERE reservation_token = $1")
            .bind(token.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn update_match(
        &self,
        record: &Match,
        expected_version: i64,
    ) -> Result<Match, StoreError> {
        let query = r#"
            UPDATE matches
            SET confirmations = $1,
                status = $2,
                meeting_details = $3,
                resolution = $4,
                resolved_at = $5,
                version = version + 1
            WHERE id = $6 AND version = $7
            RETURNING *
        "#;

        let row = sqlx::query(query)
            .bind(Json(&record.confirmations))
            .bind(record.status.as_str())
            .bind(record.meeting_details.as_ref().map(Json))
            .bind(record.resolution.as_ref().map(Json))
            .bind(record.resolved_at)
            .bind(record.id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => match_from_row(&row),
            None if self.match_exists(record.id).await? => {
                Err(StoreError::MatchConflict(record.id))
            }
            None => Err(StoreError::NotFound(format!("match {}", record.id))),
        }
    }

    async fn list_matches(&self, status: MatchStatus) -> Result<Vec<Match>, StoreError> {
        let query = r#"
            SELECT *
            FROM matches
            WHERE status = $1
            ORDER BY proposed_at ASC, id ASC
        "#;

        let rows = sqlx::query(query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn insert_meeting(
        &self,
        meeting: &ScheduledMeeting,
    ) -> Result<ScheduledMeeting, StoreError> {
        let query = r#"
            INSERT INTO scheduled_meetings (
                match_id, entry_a, entry_b, meeting_date, start_time, end_time,
                location, meeting_type, outcome, created_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (match_id) DO NOTHING
        "#;

        sqlx::query(query)
            .bind(meeting.match_id)
            .bind(meeting.entry_a)
            .bind(meeting.entry_b)
            .bind(meeting.date)
            .bind(meeting.start)
            .bind(meeting.end)
            .bind(&meeting.location)
            .bind(meeting.meeting_type.as_str())
            .bind(meeting.outcome.as_str())
            .bind(meeting.created_at)
            .bind(meeting.closed_at)
            .execute(&self.pool)
            .await?;

        self.get_meeting(meeting.match_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("meeting for match {}", meeting.match_id)))
    }

    async fn get_meeting(&self, match_id: MatchId) -> Result<Option<ScheduledMeeting>, StoreError> {
        let row = sqlx::query("SELECT * FROM scheduled_meetings WHERE match_id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(meeting_from_row).transpose()
    }

    async fn close_meeting(
        &self,
        match_id: MatchId,
        outcome: MeetingOutcome,
        closed_at: DateTime<Utc>,
    ) -> Result<ScheduledMeeting, StoreError> {
        let query = r#"
            UPDATE scheduled_meetings
            SET outcome = $1, closed_at = $3
            WHERE match_id = $2 AND outcome = 'pending'
            RETURNING *
        "#;

        let row = sqlx::query(query)
            .bind(outcome.as_str())
            .bind(match_id)
            .bind(closed_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => meeting_from_row(&row),
            None if self.get_meeting(match_id).await?.is_some() => {
                Err(StoreError::MatchConflict(match_id))
            }
            None => Err(StoreError::NotFound(format!("meeting for match {}", match_id))),
        }
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_rejects_unknown_state() {
        let err = parse_label::<EntryState>("limbo".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_parse_label_accepts_stored_state() {
        let state = parse_label::<EntryState>("scheduled".to_string()).unwrap();
        assert_eq!(state, EntryState::Scheduled);
    }
}
