// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AgeRange, AvailabilityOverlap, AvailabilityWindow, Confirmations, DeclineReason, EntryFilter,
    EntryId, EntryState, Evaluation, FollowUpPolicy, Gender, GenderPreference, LifecycleEvent,
    Match, MatchId, MatchOrigin, MatchResolution, MatchStatus, MatchingPolicy, MeetingDetails,
    MeetingOutcome, MeetingType, Party, PartyOutcome, PaymentStatus, Preferences, Profile,
    ReservationToken, ResolutionReason, ScheduledMeeting, ScoringWeights, Transition,
    VerificationStatus, WaitingEntry,
};
pub use requests::{
    ConfirmRequest, DeclineRequest, EnqueueRequest, ForceMatchRequest, ListMatchesQuery,
    ListWaitingQuery, MeetingOutcomeRequest, UpdateGatesRequest,
};
pub use responses::{
    ConfirmationResponse, EntriesResponse, ErrorResponse, HealthResponse, MatchesResponse,
    SweepResponse,
};
