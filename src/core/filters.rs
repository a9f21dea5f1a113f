use crate::models::{PaymentStatus, VerificationStatus, WaitingEntry};

/// Check whether `candidate` fits `seeker`'s stated age and gender preferences
///
/// One direction only; the evaluator calls it both ways.
#[inline]
pub fn matches_demographics(seeker: &WaitingEntry, candidate: &WaitingEntry) -> bool {
    seeker.preferences.age_range.contains(candidate.profile.age)
        && seeker
            .preferences
            .gender_preference
            .accepts(candidate.profile.gender)
}

/// Human-readable reasons `candidate` fails `seeker`'s demographic preferences
pub fn demographic_reasons(seeker: &WaitingEntry, candidate: &WaitingEntry) -> Vec<String> {
    let mut reasons = Vec::new();

    if !seeker.preferences.age_range.contains(candidate.profile.age) {
        reasons.push(format!(
            "age {} of {} is outside preferred range {} of {}",
            candidate.profile.age,
            candidate.participant_id,
            seeker.preferences.age_range,
            seeker.participant_id
        ));
    }

    if !seeker
        .preferences
        .gender_preference
        .accepts(candidate.profile.gender)
    {
        reasons.push(format!(
            "gender {} of {} does not match preference {} of {}",
            candidate.profile.gender,
            candidate.participant_id,
            seeker.preferences.gender_preference,
            seeker.participant_id
        ));
    }

    reasons
}

/// Meeting types must be identical; there is no partial credit
#[inline]
pub fn meeting_type_reason(a: &WaitingEntry, b: &WaitingEntry) -> Option<String> {
    if a.preferences.meeting_type == b.preferences.meeting_type {
        None
    } else {
        Some(format!(
            "meeting type {} of {} differs from {} of {}",
            a.preferences.meeting_type, a.participant_id, b.preferences.meeting_type, b.participant_id
        ))
    }
}

/// Verification and payment gates of a single entry
pub fn gate_reasons(entry: &WaitingEntry) -> Vec<String> {
    let mut reasons = Vec::new();

    if entry.verification_status != VerificationStatus::Verified {
        reasons.push(format!(
            "{} is not verified ({})",
            entry.participant_id, entry.verification_status
        ));
    }

    if entry.payment_status != PaymentStatus::Paid {
        reasons.push(format!(
            "{} has not paid ({})",
            entry.participant_id, entry.payment_status
        ));
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgeRange, EntryState, Gender, GenderPreference, MeetingType, Preferences, Profile,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn create_test_entry(age: u8, gender: Gender, preference: GenderPreference) -> WaitingEntry {
        WaitingEntry {
            id: Uuid::new_v4(),
            participant_id: format!("{}-{}", gender, age),
            profile: Profile { age, gender },
            preferences: Preferences {
                age_range: AgeRange { min: 24, max: 32 },
                gender_preference: preference,
                meeting_type: MeetingType::Casual,
            },
            availability: vec![],
            verification_status: VerificationStatus::Verified,
            payment_status: PaymentStatus::Paid,
            enqueued_at: Utc::now(),
            state: EntryState::Waiting,
            reservation_token: None,
            cooldown_until: None,
            updated_at: Utc::now(),
            archived_at: None,
        }
    }

    #[test]
    fn test_demographics_match() {
        let seeker = create_test_entry(26, Gender::Female, GenderPreference::Male);
        let candidate = create_test_entry(29, Gender::Male, GenderPreference::Female);

        assert!(matches_demographics(&seeker, &candidate));
        assert!(demographic_reasons(&seeker, &candidate).is_empty());
    }

    #[test]
    fn test_demographics_fail_age() {
        let seeker = create_test_entry(26, Gender::Female, GenderPreference::Male);
        let candidate = create_test_entry(40, Gender::Male, GenderPreference::Female);

        assert!(!matches_demographics(&seeker, &candidate));
        assert_eq!(demographic_reasons(&seeker, &candidate).len(), 1);
    }

    #[test]
    fn test_demographics_fail_gender() {
        let seeker = create_test_entry(26, Gender::Female, GenderPreference::Male);
        let candidate = create_test_entry(29, Gender::Female, GenderPreference::Any);

        assert!(!matches_demographics(&seeker, &candidate));
    }

    #[test]
    fn test_gate_reasons() {
        let mut entry = create_test_entry(26, Gender::Female, GenderPreference::Male);
        assert!(gate_reasons(&entry).is_empty());

        entry.verification_status = VerificationStatus::Pending;
        entry.payment_status = PaymentStatus::Refunded;

        assert_eq!(gate_reasons(&entry).len(), 2);
    }

    #[test]
    fn test_meeting_type_must_match() {
        let a = create_test_entry(26, Gender::Female, GenderPreference::Male);
        let mut b = create_test_entry(29, Gender::Male, GenderPreference::Female);
        assert!(meeting_type_reason(&a, &b).is_none());

        b.preferences.meeting_type = MeetingType::Dinner;
        assert!(meeting_type_reason(&a, &b).is_some());
    }
}
