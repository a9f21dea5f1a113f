use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::core::availability::best_overlap;
use crate::error::{EngineError, Result};
use crate::models::{
    DeclineReason, EntryId, EntryState, LifecycleEvent, Match, MatchId, MatchResolution,
    MatchStatus, MatchingPolicy, MeetingDetails, MeetingOutcome, Party, PartyOutcome,
    PaymentStatus, ResolutionReason, ScheduledMeeting, Transition, WaitingEntry,
};
use crate::services::{EntryStore, NotificationDispatcher, PaymentService, StoreError};

/// Upper bound on optimistic retries against a single match record
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// What a confirmation call ended up doing
#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    /// Recorded; still waiting on the other party
    Pending(Match),
    /// Both parties confirmed and the meeting exists
    Scheduled {
        matched: Match,
        meeting: ScheduledMeeting,
    },
    /// The match was already resolved, or its deadline had passed
    Closed(Match),
}

impl ConfirmationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Pending(_) => "pending",
            ConfirmationOutcome::Scheduled { .. } => "scheduled",
            ConfirmationOutcome::Closed(m) if m.status == MatchStatus::Expired => "expired",
            ConfirmationOutcome::Closed(_) => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired: Vec<MatchId>,
    pub repaired_entries: usize,
}

/// Drives matches from `proposed` to a terminal status and keeps the two
/// entries of each match consistent with it.
///
/// Match records change through a version compare-and-set; entries change
/// through the store's state transition. Every terminal match carries a
/// [`MatchResolution`], and applying it twice is a no-op, so a crash between
/// the two writes is repaired by the next sweep.
#[derive(Clone)]
pub struct ConfirmationCoordinator {
    store: Arc<dyn EntryStore>,
    payments: Arc<dyn PaymentService>,
    notifications: NotificationDispatcher,
    policy: Arc<MatchingPolicy>,
}

impl ConfirmationCoordinator {
    pub fn new(
        store: Arc<dyn EntryStore>,
        payments: Arc<dyn PaymentService>,
        notifications: NotificationDispatcher,
        policy: Arc<MatchingPolicy>,
    ) -> Self {
        Self {
            store,
            payments,
            notifications,
            policy,
        }
    }

    pub async fn get_match(&self, id: MatchId) -> Result<Match> {
        self.store
            .get_match(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("match {}", id)))
    }

    pub async fn get_meeting(&self, match_id: MatchId) -> Result<ScheduledMeeting> {
        self.store
            .get_meeting(match_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("meeting for match {}", match_id)))
    }

    pub async fn confirm(&self, match_id: MatchId, entry_id: EntryId) -> Result<ConfirmationOutcome> {
        self.confirm_at(match_id, entry_id, Utc::now()).await
    }

    /// Record `entry_id`'s confirmation of `match_id`
    ///
    /// Confirming twice is harmless. A confirmation arriving after the
    /// deadline expires the match instead and reports it as closed.
    pub async fn confirm_at(
        &self,
        match_id: MatchId,
        entry_id: EntryId,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut current = self.get_match(match_id).await?;
            let party = party_in(&current, entry_id)?;

            match current.status {
                MatchStatus::Proposed => {}
                MatchStatus::Confirmed => {
                    let meeting = self.schedule(&current, now).await?;
                    return Ok(ConfirmationOutcome::Scheduled {
                        matched: current,
                        meeting,
                    });
                }
                MatchStatus::Expired | MatchStatus::Cancelled => {
                    return Ok(ConfirmationOutcome::Closed(current));
                }
            }

            if current.deadline_passed(now) {
                match self.expire(current, now).await? {
                    Some(expired) => return Ok(ConfirmationOutcome::Closed(expired)),
                    None => continue,
                }
            }

            if current.confirmations.get(party) == Some(true) {
                return Ok(ConfirmationOutcome::Pending(current));
            }

            let expected = current.version;
            current.confirmations.set(party, true);
            if current.confirmations.both_confirmed() {
                current.meeting_details = Some(self.plan_meeting(&current).await?);
                current.status = MatchStatus::Confirmed;
                current.resolved_at = Some(now);
            }

            match self.store.update_match(&current, expected).await {
                Ok(saved) if saved.status == MatchStatus::Confirmed => {
                    tracing::info!("Match {} confirmed by both parties", saved.id);
                    // The confirmation is final once saved; a failed schedule
                    // below is finished by the sweep
                    if let Some(details) = &saved.meeting_details {
                        let event = LifecycleEvent::MatchConfirmed {
                            match_id: saved.id,
                            meeting: details.clone(),
                        };
                        self.notifications.dispatch(&saved.participant_a, event.clone());
                        self.notifications.dispatch(&saved.participant_b, event);
                    }
                    let meeting = self.schedule(&saved, now).await?;
                    return Ok(ConfirmationOutcome::Scheduled {
                        matched: saved,
                        meeting,
                    });
                }
                Ok(saved) => {
                    tracing::debug!("Match {} confirmed by {}", saved.id, entry_id);
                    return Ok(ConfirmationOutcome::Pending(saved));
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Match {} changed during confirmation, retrying", match_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "match {} kept changing; gave up after {} attempts",
            match_id, MAX_UPDATE_ATTEMPTS
        )))
    }

    pub async fn decline(
        &self,
        match_id: MatchId,
        entry_id: EntryId,
        reason: DeclineReason,
    ) -> Result<Match> {
        self.decline_at(match_id, entry_id, reason, Utc::now()).await
    }

    /// Cancel a proposed match on behalf of one party
    ///
    /// The counterpart always goes back to the queue with its original
    /// priority. The decliner is requeued or cancelled per policy.
    pub async fn decline_at(
        &self,
        match_id: MatchId,
        entry_id: EntryId,
        reason: DeclineReason,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut current = self.get_match(match_id).await?;
            let party = party_in(&current, entry_id)?;

            match current.status {
                MatchStatus::Proposed => {}
                MatchStatus::Expired | MatchStatus::Cancelled => return Ok(current),
                MatchStatus::Confirmed => {
                    return Err(EngineError::InvalidState(format!(
                        "match {} is already confirmed; report the meeting outcome instead",
                        match_id
                    )));
                }
            }

            if current.deadline_passed(now) {
                match self.expire(current, now).await? {
                    Some(expired) => return Ok(expired),
                    None => continue,
                }
            }

            let decliner = match reason {
                DeclineReason::NotInterested => self.policy.follow_up(self.policy.decline, now),
                DeclineReason::OptOut | DeclineReason::Withdrawn => PartyOutcome::Cancel,
            };
            let (party_a, party_b) = match party {
                Party::A => (decliner, PartyOutcome::Requeue),
                Party::B => (PartyOutcome::Requeue, decliner),
            };

            let expected = current.version;
            current.confirmations.set(party, false);
            current.status = MatchStatus::Cancelled;
            current.resolved_at = Some(now);
            current.resolution = Some(MatchResolution {
                party_a,
                party_b,
                reason: ResolutionReason::Declined {
                    by: entry_id,
                    reason,
                },
            });

            match self.store.update_match(&current, expected).await {
                Ok(saved) => {
                    tracing::info!("Match {} declined by {} ({:?})", saved.id, entry_id, reason);
                    self.apply_resolution(&saved).await?;
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Match {} changed during decline, retrying", match_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "match {} kept changing; gave up after {} attempts",
            match_id, MAX_UPDATE_ATTEMPTS
        )))
    }

    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Expire every proposed match whose deadline is at or before `now`,
    /// then repair entries left behind by interrupted writers.
    ///
    /// Running it again with the same `now` changes nothing.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for proposed in self.store.list_matches(MatchStatus::Proposed).await? {
            if !proposed.deadline_passed(now) {
                continue;
            }

            let mut current = proposed;
            for _ in 0..MAX_UPDATE_ATTEMPTS {
                if let Some(expired) = self.expire(current.clone(), now).await? {
                    report.expired.push(expired.id);
                    break;
                }
                // Lost to a concurrent confirm or decline
                current = self.get_match(current.id).await?;
                if current.status != MatchStatus::Proposed {
                    break;
                }
            }
        }

        report.repaired_entries = self.repair_proposed_entries(now).await?;

        if !report.expired.is_empty() || report.repaired_entries > 0 {
            tracing::info!(
                "Sweep expired {} matches and repaired {} entries",
                report.expired.len(),
                report.repaired_entries
            );
        }

        Ok(report)
    }

    pub async fn record_meeting_outcome(
        &self,
        match_id: MatchId,
        outcome: MeetingOutcome,
    ) -> Result<ScheduledMeeting> {
        self.record_meeting_outcome_at(match_id, outcome, Utc::now()).await
    }

    /// Close a scheduled meeting and move both entries to their final state
    pub async fn record_meeting_outcome_at(
        &self,
        match_id: MatchId,
        outcome: MeetingOutcome,
        now: DateTime<Utc>,
    ) -> Result<ScheduledMeeting> {
        let final_state = outcome.entry_state().ok_or_else(|| {
            EngineError::Validation("meeting outcome must be completed, no_show or cancelled".to_string())
        })?;

        let record = self.get_match(match_id).await?;
        if record.status != MatchStatus::Confirmed {
            return Err(EngineError::InvalidState(format!(
                "match {} is {}, not confirmed",
                match_id, record.status
            )));
        }

        let existing = self.get_meeting(match_id).await?;
        let (meeting, newly_closed) = if existing.outcome == MeetingOutcome::Pending {
            match self.store.close_meeting(match_id, outcome, now).await {
                Ok(closed) => (closed, true),
                Err(e) if e.is_conflict() => (self.get_meeting(match_id).await?, false),
                Err(e) => return Err(e.into()),
            }
        } else {
            (existing, false)
        };

        if meeting.outcome != outcome {
            return Err(EngineError::InvalidState(format!(
                "meeting for match {} was already closed as {}",
                match_id, meeting.outcome
            )));
        }

        // Re-run on repeated calls so a half-applied close is finished
        for party in [Party::A, Party::B] {
            let transition = Transition::close(record.reservation_token, final_state);
            match self.store.transition(record.entry(party), transition).await {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Entry {} already closed", record.entry(party));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if newly_closed {
            tracing::info!("Meeting for match {} closed as {}", match_id, outcome);
            let event = LifecycleEvent::MeetingClosed { match_id, outcome };
            self.notifications.dispatch(&record.participant_a, event.clone());
            self.notifications.dispatch(&record.participant_b, event);
        }

        Ok(meeting)
    }

    pub async fn withdraw(&self, entry_id: EntryId) -> Result<WaitingEntry> {
        self.withdraw_at(entry_id, Utc::now()).await
    }

    /// Take an entry out of the queue for good
    ///
    /// A waiting entry is cancelled directly; a proposed one declines its
    /// match first. Scheduled and closed entries cannot be withdrawn.
    pub async fn withdraw_at(&self, entry_id: EntryId, now: DateTime<Utc>) -> Result<WaitingEntry> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let entry = self
                .store
                .get(entry_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("entry {}", entry_id)))?;

            match entry.state {
                EntryState::Waiting => {
                    match self.store.transition(entry_id, Transition::withdraw()).await {
                        Ok(withdrawn) => {
                            tracing::info!("Entry {} withdrawn from the queue", entry_id);
                            self.refund_cancelled(&withdrawn, None).await;
                            self.notifications.dispatch(
                                &withdrawn.participant_id,
                                LifecycleEvent::EntryCancelled { entry_id },
                            );
                            return Ok(withdrawn);
                        }
                        Err(e) if e.is_conflict() => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                EntryState::Proposed => {
                    let token = entry.reservation_token.ok_or_else(|| {
                        EngineError::InvalidState(format!("entry {} is proposed without a reservation", entry_id))
                    })?;
                    let record = self.store.find_match_by_token(token).await?.ok_or_else(|| {
                        EngineError::Conflict(format!("entry {} is being matched; retry shortly", entry_id))
                    })?;

                    self.decline_at(record.id, entry_id, DeclineReason::Withdrawn, now).await?;

                    let after = self
                        .store
                        .get(entry_id)
                        .await?
                        .ok_or_else(|| EngineError::NotFound(format!("entry {}", entry_id)))?;
                    if after.state != EntryState::Waiting {
                        return Ok(after);
                    }
                    // The match expired first and requeued us; withdraw from the queue
                }
                EntryState::Scheduled => {
                    return Err(EngineError::InvalidState(format!(
                        "entry {} has a scheduled meeting; report its outcome instead",
                        entry_id
                    )));
                }
                EntryState::Completed | EntryState::Cancelled => {
                    return Err(EngineError::InvalidState(format!(
                        "entry {} is already {}",
                        entry_id, entry.state
                    )));
                }
            }
        }

        Err(EngineError::Conflict(format!(
            "entry {} kept changing; gave up after {} attempts",
            entry_id, MAX_UPDATE_ATTEMPTS
        )))
    }

    /// Move a proposed match past its deadline to `expired`.
    /// Returns `None` if another writer changed the match first.
    async fn expire(&self, mut current: Match, now: DateTime<Utc>) -> Result<Option<Match>> {
        let outcome_for = |party: Party| {
            if current.confirmations.get(party) == Some(true) {
                PartyOutcome::Requeue
            } else {
                self.policy.follow_up(self.policy.non_response, now)
            }
        };
        let resolution = MatchResolution {
            party_a: outcome_for(Party::A),
            party_b: outcome_for(Party::B),
            reason: ResolutionReason::DeadlineElapsed,
        };

        let expected = current.version;
        current.status = MatchStatus::Expired;
        current.resolved_at = Some(now);
        current.resolution = Some(resolution);

        match self.store.update_match(&current, expected).await {
            Ok(saved) => {
                tracing::info!(
                    "Match {} expired at deadline {}",
                    saved.id,
                    saved.confirmation_deadline
                );
                self.apply_resolution(&saved).await?;
                Ok(Some(saved))
            }
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a terminal match's stored resolution to both entries.
    /// Returns how many entries actually moved.
    async fn apply_resolution(&self, record: &Match) -> Result<usize> {
        let Some(resolution) = record.resolution else {
            return Ok(0);
        };
        let event = match record.status {
            MatchStatus::Expired => LifecycleEvent::MatchExpired { match_id: record.id },
            _ => LifecycleEvent::MatchCancelled { match_id: record.id },
        };

        let mut moved = 0;
        for party in [Party::A, Party::B] {
            let entry_id = record.entry(party);
            let token = record.reservation_token;
            let transition = match resolution.outcome(party) {
                PartyOutcome::Requeue => Transition::release(token, None),
                PartyOutcome::RequeueAfter(until) => Transition::release(token, Some(until)),
                PartyOutcome::Cancel => Transition::cancel_proposed(token),
            };

            let entry = match self.store.transition(entry_id, transition).await {
                Ok(entry) => entry,
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Entry {} already resolved for match {}", entry_id, record.id);
                    continue;
                }
                Err(StoreError::NotFound(what)) => {
                    tracing::warn!("Match {} references missing {}", record.id, what);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            moved += 1;

            self.notifications.dispatch(&entry.participant_id, event.clone());
            if entry.state == EntryState::Cancelled {
                self.notifications
                    .dispatch(&entry.participant_id, LifecycleEvent::EntryCancelled { entry_id });
                self.refund_cancelled(&entry, Some(record.id)).await;
            } else {
                self.notifications.dispatch(
                    &entry.participant_id,
                    LifecycleEvent::Requeued {
                        entry_id,
                        cooldown_until: entry.cooldown_until,
                    },
                );
            }
        }

        Ok(moved)
    }

    /// Create the meeting for a confirmed match and move both entries to
    /// `scheduled`. Safe to repeat.
    async fn schedule(&self, record: &Match, now: DateTime<Utc>) -> Result<ScheduledMeeting> {
        let details = match &record.meeting_details {
            Some(details) => details.clone(),
            None => self.plan_meeting(record).await?,
        };

        let meeting = self
            .store
            .insert_meeting(&ScheduledMeeting {
                match_id: record.id,
                entry_a: record.entry_a,
                entry_b: record.entry_b,
                date: details.date,
                start: details.start,
                end: details.end,
                location: details.location,
                meeting_type: details.meeting_type,
                outcome: MeetingOutcome::Pending,
                created_at: now,
                closed_at: None,
            })
            .await?;

        for party in [Party::A, Party::B] {
            let entry_id = record.entry(party);
            match self
                .store
                .transition(entry_id, Transition::schedule(record.reservation_token))
                .await
            {
                Ok(_) => {}
                Err(StoreError::Conflict { actual, .. }) if actual != EntryState::Waiting => {
                    tracing::debug!("Entry {} already {}", entry_id, actual);
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    tracing::error!("Entry {} of confirmed match {} is inconsistent: {}", entry_id, record.id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(meeting)
    }

    /// Meeting slot from the shared availability, venue from policy
    async fn plan_meeting(&self, record: &Match) -> Result<MeetingDetails> {
        let entry_a = self.load_entry(record.entry_a).await?;
        let entry_b = self.load_entry(record.entry_b).await?;

        let slot = record
            .overlap
            .or_else(|| best_overlap(&entry_a.availability, &entry_b.availability))
            .map(|o| (o.date, o.start, o.end))
            .or_else(|| entry_a.availability.first().map(|w| (w.date, w.start, w.end)))
            .ok_or_else(|| {
                EngineError::InvalidState(format!("match {} has no availability to schedule", record.id))
            })?;

        let (date, start, slot_end) = slot;
        let end = start + self.policy.default_meeting;
        let end = if end > start && end < slot_end { end } else { slot_end };
        let meeting_type = entry_a.preferences.meeting_type;

        Ok(MeetingDetails {
            date,
            start,
            end,
            location: self.policy.venue(meeting_type),
            meeting_type,
        })
    }

    /// Bring `proposed` entries in line with their match, or release them
    /// when the match was never recorded.
    async fn repair_proposed_entries(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut repaired = 0;

        for entry in self.store.list_by_state(EntryState::Proposed).await? {
            let Some(token) = entry.reservation_token else {
                continue;
            };

            match self.store.find_match_by_token(token).await? {
                Some(record) => match record.status {
                    MatchStatus::Proposed => {}
                    MatchStatus::Confirmed => {
                        self.schedule(&record, now).await?;
                        repaired += 1;
                    }
                    MatchStatus::Expired | MatchStatus::Cancelled => {
                        repaired += self.apply_resolution(&record).await?;
                    }
                },
                None if now - entry.updated_at >= self.policy.orphan_grace => {
                    match self.store.transition(entry.id, Transition::unreserve(token)).await {
                        Ok(_) => {
                            tracing::warn!("Released orphaned reservation of entry {}", entry.id);
                            repaired += 1;
                        }
                        Err(e) if e.is_conflict() => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                None => {}
            }
        }

        Ok(repaired)
    }

    async fn load_entry(&self, id: EntryId) -> Result<WaitingEntry> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("entry {}", id)))
    }

    /// Best-effort refund for a paid entry that ended without a meeting
    async fn refund_cancelled(&self, entry: &WaitingEntry, match_id: Option<MatchId>) {
        if !self.policy.refund_cancelled || entry.payment_status != PaymentStatus::Paid {
            return;
        }

        match self.payments.refund(&entry.participant_id, match_id).await {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .update_gates(entry.id, None, Some(PaymentStatus::Refunded))
                    .await
                {
                    tracing::warn!("Refunded {} but failed to record it: {}", entry.id, e);
                }
            }
            Err(e) => tracing::warn!("Refund for entry {} failed: {}", entry.id, e),
        }
    }
}

fn party_in(record: &Match, entry_id: EntryId) -> Result<Party> {
    record.party_of(entry_id).ok_or_else(|| {
        EngineError::Validation(format!("entry {} is not part of match {}", entry_id, record.id))
    })
}
