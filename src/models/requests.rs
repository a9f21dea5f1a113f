use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::domain::{
    AvailabilityWindow, DeclineReason, EntryFilter, Gender, GenderPreference, MatchStatus,
    MeetingOutcome, MeetingType, PaymentStatus, VerificationStatus,
};

/// Request to join the blind date queue
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 128))]
    #[serde(alias = "participant_id", rename = "participantId")]
    pub participant_id: String,
    #[validate(range(min = 18, max = 120))]
    pub age: u8,
    pub gender: Gender,
    #[validate(range(min = 18, max = 120))]
    #[serde(alias = "preferred_age_min", rename = "preferredAgeMin")]
    pub preferred_age_min: u8,
    #[validate(range(min = 18, max = 120))]
    #[serde(alias = "preferred_age_max", rename = "preferredAgeMax")]
    pub preferred_age_max: u8,
    #[serde(alias = "gender_preference", rename = "genderPreference")]
    pub gender_preference: GenderPreference,
    #[serde(alias = "meeting_type", rename = "meetingType")]
    pub meeting_type: MeetingType,
    #[validate(length(min = 1, max = 28))]
    pub availability: Vec<AvailabilityWindow>,
}

/// Status callback from the verification or payment collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateGatesRequest {
    #[serde(default, alias = "verification_status", rename = "verificationStatus")]
    pub verification_status: Option<VerificationStatus>,
    #[serde(default, alias = "payment_status", rename = "paymentStatus")]
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    #[serde(alias = "entry_id", rename = "entryId")]
    pub entry_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclineRequest {
    #[serde(alias = "entry_id", rename = "entryId")]
    pub entry_id: Uuid,
    #[serde(default)]
    pub reason: DeclineReason,
}

/// Operator request to pair two specific entries
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForceMatchRequest {
    #[serde(alias = "entry_a", rename = "entryA")]
    pub entry_a: Uuid,
    #[serde(alias = "entry_b", rename = "entryB")]
    pub entry_b: Uuid,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub justification: Option<String>,
}

/// External meeting-completion signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingOutcomeRequest {
    pub outcome: MeetingOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListWaitingQuery {
    #[serde(default, alias = "meeting_type", rename = "meetingType")]
    pub meeting_type: Option<MeetingType>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default, alias = "eligible_only", rename = "eligibleOnly")]
    pub eligible_only: Option<bool>,
}

impl From<ListWaitingQuery> for EntryFilter {
    fn from(query: ListWaitingQuery) -> Self {
        EntryFilter {
            meeting_type: query.meeting_type,
            gender: query.gender,
            eligible_only: query.eligible_only.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMatchesQuery {
    #[serde(default = "default_status")]
    pub status: MatchStatus,
}

fn default_status() -> MatchStatus {
    MatchStatus::Proposed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_request_deserializes_camel_case() {
        let json = r#"{
            "participantId": "p-1",
            "age": 26,
            "gender": "female",
            "preferredAgeMin": 24,
            "preferredAgeMax": 32,
            "genderPreference": "male",
            "meetingType": "casual",
            "availability": [{"date": "2025-12-28", "start": "18:00:00", "end": "20:00:00"}]
        }"#;

        let req: EnqueueRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.participant_id, "p-1");
        assert_eq!(req.gender_preference, GenderPreference::Male);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_enqueue_request_rejects_minor() {
        let json = r#"{
            "participantId": "p-2",
            "age": 17,
            "gender": "male",
            "preferredAgeMin": 18,
            "preferredAgeMax": 25,
            "genderPreference": "any",
            "meetingType": "coffee",
            "availability": [{"date": "2025-12-28", "start": "18:00:00", "end": "20:00:00"}]
        }"#;

        let req: EnqueueRequest = serde_json::from_str(json).unwrap();

        assert!(req.validate().is_err());
    }

    #[test]
    fn test_decline_reason_defaults() {
        let req: DeclineRequest =
            serde_json::from_str(r#"{"entryId": "6f1c1f7e-8d6b-4c41-9d55-6a3b8a8f9f10"}"#).unwrap();

        assert_eq!(req.reason, DeclineReason::NotInterested);
    }
}
