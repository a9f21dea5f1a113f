use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type EntryId = Uuid;
pub type MatchId = Uuid;

/// Opaque value stamped on both entries of a pair while a Match holds them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationToken(pub Uuid);

impl ReservationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error returned when a stored or submitted enum label is unknown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display` and `FromStr` over the snake_case labels
/// used both in JSON and in the database.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    NonBinary,
}

labelled_enum!(Gender {
    Female => "female",
    Male => "male",
    NonBinary => "non_binary",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    Any,
    Female,
    Male,
    NonBinary,
}

impl GenderPreference {
    pub fn accepts(self, gender: Gender) -> bool {
        matches!(
            (self, gender),
            (GenderPreference::Any, _)
                | (GenderPreference::Female, Gender::Female)
                | (GenderPreference::Male, Gender::Male)
                | (GenderPreference::NonBinary, Gender::NonBinary)
        )
    }
}

labelled_enum!(GenderPreference {
    Any => "any",
    Female => "female",
    Male => "male",
    NonBinary => "non_binary",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Casual,
    Coffee,
    Drinks,
    Dinner,
    Activity,
}

labelled_enum!(MeetingType {
    Casual => "casual",
    Coffee => "coffee",
    Drinks => "drinks",
    Dinner => "dinner",
    Activity => "activity",
});

/// Inclusive age bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl AgeRange {
    #[inline]
    pub fn contains(&self, age: u8) -> bool {
        age >= self.min && age <= self.max
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub age: u8,
    pub gender: Gender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub age_range: AgeRange,
    pub gender_preference: GenderPreference,
    pub meeting_type: MeetingType,
}

/// A time window on a given day in which a participant can meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl AvailabilityWindow {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self { date, start, end }
    }
}

/// Shared slot of two availability windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverlap {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl AvailabilityOverlap {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Pending,
}

labelled_enum!(VerificationStatus {
    Verified => "verified",
    Pending => "pending",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Refunded,
}

labelled_enum!(PaymentStatus {
    Paid => "paid",
    Pending => "pending",
    Refunded => "refunded",
});

/// Lifecycle state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Waiting,
    Proposed,
    Scheduled,
    Completed,
    Cancelled,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryState::Completed | EntryState::Cancelled)
    }
}

labelled_enum!(EntryState {
    Waiting => "waiting",
    Proposed => "proposed",
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// A participant's queued request to be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEntry {
    pub id: EntryId,
    pub participant_id: String,
    pub profile: Profile,
    pub preferences: Preferences,
    pub availability: Vec<AvailabilityWindow>,
    pub verification_status: VerificationStatus,
    pub payment_status: PaymentStatus,
    pub enqueued_at: DateTime<Utc>,
    pub state: EntryState,
    pub reservation_token: Option<ReservationToken>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl WaitingEntry {
    /// Verification and payment gates both open
    pub fn gates_open(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
            && self.payment_status == PaymentStatus::Paid
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map_or(false, |until| until > now)
    }
}

/// Predicate for waiting-pool queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    #[serde(default)]
    pub meeting_type: Option<MeetingType>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub eligible_only: bool,
}

impl EntryFilter {
    /// Entries whose verification and payment gates are open
    pub fn eligible() -> Self {
        Self {
            eligible_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &WaitingEntry) -> bool {
        if self.eligible_only && !entry.gates_open() {
            return false;
        }
        if let Some(meeting_type) = self.meeting_type {
            if entry.preferences.meeting_type != meeting_type {
                return false;
            }
        }
        if let Some(gender) = self.gender {
            if entry.profile.gender != gender {
                return false;
            }
        }
        true
    }
}

/// Compare-and-set request against an entry's `(state, reservation_token)` pair.
///
/// `enqueued_at` is never part of a transition, so any path back to
/// `Waiting` keeps the entry's original queue priority. With
/// `keep_cooldown` set the stored `cooldown_until` is left as it is and
/// the `cooldown_until` field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub expected_state: EntryState,
    pub expected_token: Option<ReservationToken>,
    pub new_state: EntryState,
    pub new_token: Option<ReservationToken>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub keep_cooldown: bool,
}

impl Transition {
    /// `Waiting -> Proposed`, claiming the entry for a match
    pub fn reserve(token: ReservationToken) -> Self {
        Self {
            expected_state: EntryState::Waiting,
            expected_token: None,
            new_state: EntryState::Proposed,
            new_token: Some(token),
            cooldown_until: None,
            keep_cooldown: true,
        }
    }

    /// Undo a reservation that never became a match. Unlike `release`, the
    /// entry gets back whatever cooldown it had when it was reserved.
    pub fn unreserve(token: ReservationToken) -> Self {
        Self {
            expected_state: EntryState::Proposed,
            expected_token: Some(token),
            new_state: EntryState::Waiting,
            new_token: None,
            cooldown_until: None,
            keep_cooldown: true,
        }
    }

    /// `Proposed -> Waiting`, optionally held back until `cooldown_until`
    pub fn release(token: ReservationToken, cooldown_until: Option<DateTime<Utc>>) -> Self {
        Self {
            expected_state: EntryState::Proposed,
            expected_token: Some(token),
            new_state: EntryState::Waiting,
            new_token: None,
            cooldown_until,
            keep_cooldown: false,
        }
    }

    pub fn schedule(token: ReservationToken) -> Self {
        Self {
            expected_state: EntryState::Proposed,
            expected_token: Some(token),
            new_state: EntryState::Scheduled,
            new_token: Some(token),
            cooldown_until: None,
            keep_cooldown: false,
        }
    }

    /// `Proposed -> Cancelled`; the token is kept for audit
    pub fn cancel_proposed(token: ReservationToken) -> Self {
        Self {
            expected_state: EntryState::Proposed,
            expected_token: Some(token),
            new_state: EntryState::Cancelled,
            new_token: Some(token),
            cooldown_until: None,
            keep_cooldown: false,
        }
    }

    pub fn withdraw() -> Self {
        Self {
            expected_state: EntryState::Waiting,
            expected_token: None,
            new_state: EntryState::Cancelled,
            new_token: None,
            cooldown_until: None,
            keep_cooldown: false,
        }
    }

    /// `Scheduled -> Completed | Cancelled` once the meeting is closed out
    pub fn close(token: ReservationToken, new_state: EntryState) -> Self {
        Self {
            expected_state: EntryState::Scheduled,
            expected_token: Some(token),
            new_state,
            new_token: Some(token),
            cooldown_until: None,
            keep_cooldown: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Proposed,
    Confirmed,
    Expired,
    Cancelled,
}

labelled_enum!(MatchStatus {
    Proposed => "proposed",
    Confirmed => "confirmed",
    Expired => "expired",
    Cancelled => "cancelled",
});

/// One side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    A,
    B,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::A => Party::B,
            Party::B => Party::A,
        }
    }
}

/// Per-party answer; `None` while the party has not responded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmations {
    pub a: Option<bool>,
    pub b: Option<bool>,
}

impl Confirmations {
    pub fn get(&self, party: Party) -> Option<bool> {
        match party {
            Party::A => self.a,
            Party::B => self.b,
        }
    }

    pub fn set(&mut self, party: Party, value: bool) {
        match party {
            Party::A => self.a = Some(value),
            Party::B => self.b = Some(value),
        }
    }

    pub fn both_confirmed(&self) -> bool {
        self.a == Some(true) && self.b == Some(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    NotInterested,
    OptOut,
    Withdrawn,
}

impl Default for DeclineReason {
    fn default() -> Self {
        DeclineReason::NotInterested
    }
}

/// How a match came to be proposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOrigin {
    Automatic,
    AdminOverride {
        justification: Option<String>,
        waived_reasons: Vec<String>,
    },
}

/// What happens to an entry once its proposed match is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "until", rename_all = "snake_case")]
pub enum PartyOutcome {
    Requeue,
    RequeueAfter(DateTime<Utc>),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionReason {
    Declined { by: EntryId, reason: DeclineReason },
    DeadlineElapsed,
}

/// Outcome recorded together with a terminal match status, so that it can be
/// re-applied to the entries any number of times with the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResolution {
    pub party_a: PartyOutcome,
    pub party_b: PartyOutcome,
    pub reason: ResolutionReason,
}

impl MatchResolution {
    pub fn outcome(&self, party: Party) -> PartyOutcome {
        match party {
            Party::A => self.party_a,
            Party::B => self.party_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetails {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub location: String,
    pub meeting_type: MeetingType,
}

/// A proposed or confirmed pairing of two entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub entry_a: EntryId,
    pub entry_b: EntryId,
    pub participant_a: String,
    pub participant_b: String,
    pub compatibility_score: f64,
    pub proposed_at: DateTime<Utc>,
    pub confirmation_deadline: DateTime<Utc>,
    pub confirmations: Confirmations,
    pub status: MatchStatus,
    pub meeting_details: Option<MeetingDetails>,
    pub reservation_token: ReservationToken,
    pub overlap: Option<AvailabilityOverlap>,
    pub origin: MatchOrigin,
    pub resolution: Option<MatchResolution>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Match {
    pub fn party_of(&self, entry_id: EntryId) -> Option<Party> {
        if entry_id == self.entry_a {
            Some(Party::A)
        } else if entry_id == self.entry_b {
            Some(Party::B)
        } else {
            None
        }
    }

    pub fn entry(&self, party: Party) -> EntryId {
        match party {
            Party::A => self.entry_a,
            Party::B => self.entry_b,
        }
    }

    pub fn participant(&self, party: Party) -> &str {
        match party {
            Party::A => &self.participant_a,
            Party::B => &self.participant_b,
        }
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.confirmation_deadline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingOutcome {
    Pending,
    Completed,
    NoShow,
    Cancelled,
}

impl MeetingOutcome {
    /// Final entry state for both parties once the meeting is closed out
    pub fn entry_state(self) -> Option<EntryState> {
        match self {
            MeetingOutcome::Pending => None,
            MeetingOutcome::Completed => Some(EntryState::Completed),
            MeetingOutcome::NoShow | MeetingOutcome::Cancelled => Some(EntryState::Cancelled),
        }
    }
}

labelled_enum!(MeetingOutcome {
    Pending => "pending",
    Completed => "completed",
    NoShow => "no_show",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMeeting {
    pub match_id: MatchId,
    pub entry_a: EntryId,
    pub entry_b: EntryId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub location: String,
    pub meeting_type: MeetingType,
    pub outcome: MeetingOutcome,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Result of evaluating two entries against each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub eligible: bool,
    pub score: f64,
    pub reasons: Vec<String>,
    pub overlap: Option<AvailabilityOverlap>,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub overlap: f64,
    pub wait_parity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            overlap: 0.70,
            wait_parity: 0.30,
        }
    }
}

/// What to do with a party that declined or never answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpPolicy {
    Cancel,
    RequeueWithCooldown,
}

/// Engine-wide policy parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingPolicy {
    pub min_overlap: Duration,
    pub overlap_saturation: Duration,
    pub confirmation_window: Duration,
    pub cooldown: Duration,
    pub orphan_grace: Duration,
    pub non_response: FollowUpPolicy,
    pub decline: FollowUpPolicy,
    pub entry_fee_cents: u64,
    pub refund_cancelled: bool,
    pub default_meeting: Duration,
    pub venues: HashMap<MeetingType, String>,
}

impl MatchingPolicy {
    /// Outcome for a party under the given follow-up policy
    pub fn follow_up(&self, policy: FollowUpPolicy, now: DateTime<Utc>) -> PartyOutcome {
        match policy {
            FollowUpPolicy::Cancel => PartyOutcome::Cancel,
            FollowUpPolicy::RequeueWithCooldown => PartyOutcome::RequeueAfter(now + self.cooldown),
        }
    }

    pub fn venue(&self, meeting_type: MeetingType) -> String {
        self.venues
            .get(&meeting_type)
            .cloned()
            .unwrap_or_else(|| "To be arranged".to_string())
    }
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            min_overlap: Duration::minutes(60),
            overlap_saturation: Duration::minutes(180),
            confirmation_window: Duration::hours(24),
            cooldown: Duration::hours(24),
            orphan_grace: Duration::minutes(5),
            non_response: FollowUpPolicy::Cancel,
            decline: FollowUpPolicy::RequeueWithCooldown,
            entry_fee_cents: 2500,
            refund_cancelled: true,
            default_meeting: Duration::minutes(90),
            venues: HashMap::new(),
        }
    }
}

/// Event sent to participants on every match and meeting transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    MatchProposed {
        match_id: MatchId,
        deadline: DateTime<Utc>,
    },
    MatchConfirmed {
        match_id: MatchId,
        meeting: MeetingDetails,
    },
    MatchExpired {
        match_id: MatchId,
    },
    MatchCancelled {
        match_id: MatchId,
    },
    Requeued {
        entry_id: EntryId,
        cooldown_until: Option<DateTime<Utc>>,
    },
    EntryCancelled {
        entry_id: EntryId,
    },
    MeetingClosed {
        match_id: MatchId,
        outcome: MeetingOutcome,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::MatchProposed { .. } => "match_proposed",
            LifecycleEvent::MatchConfirmed { .. } => "match_confirmed",
            LifecycleEvent::MatchExpired { .. } => "match_expired",
            LifecycleEvent::MatchCancelled { .. } => "match_cancelled",
            LifecycleEvent::Requeued { .. } => "requeued",
            LifecycleEvent::EntryCancelled { .. } => "entry_cancelled",
            LifecycleEvent::MeetingClosed { .. } => "meeting_closed",
        }
    }
}
