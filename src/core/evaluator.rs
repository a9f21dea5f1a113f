use chrono::Duration;

use crate::core::{
    availability::best_overlap,
    filters::{demographic_reasons, gate_reasons, meeting_type_reason},
    scoring::calculate_match_score,
};
use crate::models::{Evaluation, MatchingPolicy, ScoringWeights, WaitingEntry};

/// Pure compatibility check between two entries
///
/// # Rules
/// 1. Each age within the other's preferred range
/// 2. Each gender accepted by the other's preference
/// 3. Identical meeting type
/// 4. Availability overlapping by at least `min_overlap` on the same date
/// 5. Both entries verified and paid
///
/// Every rule is checked from both sides, so `evaluate(a, b)` and
/// `evaluate(b, a)` always agree on eligibility and score.
#[derive(Debug, Clone)]
pub struct CompatibilityEvaluator {
    weights: ScoringWeights,
    min_overlap: Duration,
    saturation: Duration,
}

impl CompatibilityEvaluator {
    pub fn new(weights: ScoringWeights, min_overlap: Duration, saturation: Duration) -> Self {
        Self {
            weights,
            min_overlap,
            saturation,
        }
    }

    pub fn from_policy(policy: &MatchingPolicy, weights: ScoringWeights) -> Self {
        Self::new(weights, policy.min_overlap, policy.overlap_saturation)
    }

    pub fn min_overlap(&self) -> Duration {
        self.min_overlap
    }

    pub fn evaluate(&self, a: &WaitingEntry, b: &WaitingEntry) -> Evaluation {
        let mut reasons = Vec::new();

        if a.id == b.id {
            reasons.push(format!("entry {} cannot be matched with itself", a.id));
        }

        // Rules 1 & 2
        reasons.extend(demographic_reasons(a, b));
        reasons.extend(demographic_reasons(b, a));

        // Rule 3
        reasons.extend(meeting_type_reason(a, b));

        // Rule 4
        let overlap = best_overlap(&a.availability, &b.availability);
        match &overlap {
            Some(o) if o.minutes() >= self.min_overlap.num_minutes() => {}
            Some(o) => reasons.push(format!(
                "availability overlaps only {} minutes on {}, {} required",
                o.minutes(),
                o.date,
                self.min_overlap.num_minutes()
            )),
            None => reasons.push("availability windows do not overlap".to_string()),
        }

        // Rule 5
        reasons.extend(gate_reasons(a));
        reasons.extend(gate_reasons(b));

        let score = calculate_match_score(a, b, overlap.as_ref(), &self.weights, self.saturation);

        Evaluation {
            eligible: reasons.is_empty(),
            score,
            reasons,
            overlap,
        }
    }
}

impl Default for CompatibilityEvaluator {
    fn default() -> Self {
        Self::from_policy(&MatchingPolicy::default(), ScoringWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgeRange, AvailabilityWindow, EntryState, Gender, GenderPreference, MeetingType,
        PaymentStatus, Preferences, Profile, VerificationStatus,
    };
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    fn create_entry(
        age: u8,
        gender: Gender,
        preference: GenderPreference,
        range: (u8, u8),
        day: u32,
        hours: (u32, u32),
    ) -> WaitingEntry {
        WaitingEntry {
            id: Uuid::new_v4(),
            participant_id: format!("{}-{}", gender, age),
            profile: Profile { age, gender },
            preferences: Preferences {
                age_range: AgeRange { min: range.0, max: range.1 },
                gender_preference: preference,
                meeting_type: MeetingType::Casual,
            },
            availability: vec![AvailabilityWindow::new(
                NaiveDate::from_ymd_opt(2025, 12, day).unwrap(),
                NaiveTime::from_hms_opt(hours.0, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(hours.1, 0, 0).unwrap(),
            )],
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
    fn test_compatible_pair_is_eligible() {
        let evaluator = CompatibilityEvaluator::default();
        let a = create_entry(26, Gender::Female, GenderPreference::Male, (24, 32), 28, (18, 20));
        let b = create_entry(29, Gender::Male, GenderPreference::Female, (25, 30), 28, (18, 20));

        let result = evaluator.evaluate(&a, &b);

        assert!(result.eligible, "unexpected reasons: {:?}", result.reasons);
        assert_eq!(result.overlap.unwrap().minutes(), 120);
        assert!(result.score > 0.0);
    }

    #[test]
    fn test_short_overlap_is_rejected() {
        let evaluator = CompatibilityEvaluator::default();
        let a = create_entry(26, Gender::Female, GenderPreference::Male, (24, 32), 28, (18, 20));
        let b = create_entry(29, Gender::Male, GenderPreference::Female, (25, 30), 28, (19, 22));

        // 19:00-20:00 is exactly the 60 minute minimum
        assert!(evaluator.evaluate(&a, &b).eligible);

        let strict = CompatibilityEvaluator::new(
            ScoringWeights::default(),
            Duration::minutes(90),
            Duration::minutes(180),
        );
        let result = strict.evaluate(&a, &b);
        assert!(!result.eligible);
        assert!(result.reasons[0].contains("overlaps only 60 minutes"));
    }

    #[test]
    fn test_one_sided_preference_is_rejected() {
        let evaluator = CompatibilityEvaluator::default();
        // b accepts a, but a wants someone 30-35
        let a = create_entry(26, Gender::Female, GenderPreference::Male, (30, 35), 28, (18, 20));
        let b = create_entry(29, Gender::Male, GenderPreference::Female, (25, 30), 28, (18, 20));

        let ab = evaluator.evaluate(&a, &b);
        let ba = evaluator.evaluate(&b, &a);

        assert!(!ab.eligible);
        assert_eq!(ab.eligible, ba.eligible);
        assert_eq!(ab.score, ba.score);
    }

    #[test]
    fn test_unpaid_entry_is_rejected() {
        let evaluator = CompatibilityEvaluator::default();
        let a = create_entry(26, Gender::Female, GenderPreference::Male, (24, 32), 28, (18, 20));
        let mut b = create_entry(29, Gender::Male, GenderPreference::Female, (25, 30), 28, (18, 20));
        b.payment_status = PaymentStatus::Pending;

        let result = evaluator.evaluate(&a, &b);

        assert!(!result.eligible);
        assert_eq!(result.reasons.len(), 1);
    }
}
