// Unit tests for the Lume blind date engine

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use lume_blind_date::core::{
    availability::{best_overlap, is_valid_window, window_overlap},
    evaluator::CompatibilityEvaluator,
    scoring::calculate_match_score,
};
use lume_blind_date::models::{
    AgeRange, AvailabilityWindow, EntryState, Gender, GenderPreference, MeetingType,
    PaymentStatus, Preferences, Profile, ScoringWeights, VerificationStatus, WaitingEntry,
};
use uuid::Uuid;

fn window(day: u32, start: (u32, u32), end: (u32, u32)) -> AvailabilityWindow {
    AvailabilityWindow::new(
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap(),
        NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
        NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
    )
}

fn create_entry(
    age: u8,
    gender: Gender,
    preference: GenderPreference,
    range: (u8, u8),
    availability: Vec<AvailabilityWindow>,
) -> WaitingEntry {
    let now = Utc::now();
    WaitingEntry {
        id: Uuid::new_v4(),
        participant_id: format!("{}-{}", gender, age),
        profile: Profile { age, gender },
        preferences: Preferences {
            age_range: AgeRange { min: range.0, max: range.1 },
            gender_preference: preference,
            meeting_type: MeetingType::Casual,
        },
        availability,
        verification_status: VerificationStatus::Verified,
        payment_status: PaymentStatus::Paid,
        enqueued_at: now,
        state: EntryState::Waiting,
        reservation_token: None,
        cooldown_until: None,
        updated_at: now,
        archived_at: None,
    }
}

fn party_a() -> WaitingEntry {
    create_entry(26, Gender::Female, GenderPreference::Male, (24, 32), vec![window(28, (18, 0), (20, 0))])
}

fn party_b() -> WaitingEntry {
    create_entry(29, Gender::Male, GenderPreference::Female, (25, 30), vec![window(28, (18, 0), (20, 0))])
}

#[test]
fn test_compatible_pair_from_same_evening() {
    let evaluator = CompatibilityEvaluator::default();

    let result = evaluator.evaluate(&party_a(), &party_b());

    assert!(result.eligible, "unexpected reasons: {:?}", result.reasons);
    assert!(result.reasons.is_empty());
    let overlap = result.overlap.unwrap();
    assert_eq!(overlap.minutes(), 120);
    assert_eq!(overlap.date, NaiveDate::from_ymd_opt(2025, 12, 28).unwrap());
}

#[test]
fn test_different_days_never_overlap() {
    let evaluator = CompatibilityEvaluator::default();
    let mut b = party_b();
    b.availability = vec![window(29, (19, 0), (21, 0))];

    let result = evaluator.evaluate(&party_a(), &b);

    assert!(!result.eligible);
    assert!(result.overlap.is_none());
    assert_eq!(result.reasons, vec!["availability windows do not overlap".to_string()]);
}

#[test]
fn test_every_failed_rule_is_reported() {
    let evaluator = CompatibilityEvaluator::default();
    let a = party_a();
    let mut b = create_entry(45, Gender::Female, GenderPreference::Male, (50, 60), vec![window(30, (9, 0), (10, 0))]);
    b.preferences.meeting_type = MeetingType::Dinner;
    b.verification_status = VerificationStatus::Pending;

    let result = evaluator.evaluate(&a, &b);

    assert!(!result.eligible);
    // Age and gender both ways, meeting type, overlap, verification
    assert_eq!(result.reasons.len(), 7, "reasons: {:?}", result.reasons);
}

#[test]
fn test_evaluation_is_symmetric() {
    let evaluator = CompatibilityEvaluator::default();
    let genders = [Gender::Female, Gender::Male, Gender::NonBinary];
    let preferences = [
        GenderPreference::Any,
        GenderPreference::Female,
        GenderPreference::Male,
        GenderPreference::NonBinary,
    ];

    let mut pool = Vec::new();
    for (i, gender) in genders.iter().enumerate() {
        for (j, preference) in preferences.iter().enumerate() {
            let age = 22 + (i * 4 + j) as u8;
            let mut entry = create_entry(
                age,
                *gender,
                *preference,
                (20 + j as u8, 30 + i as u8 * 3),
                vec![window(28, (17 + (j as u32 % 3), 0), (21, 0))],
            );
            entry.enqueued_at = Utc::now() - Duration::hours((i * 7 + j) as i64);
            pool.push(entry);
        }
    }

    for a in &pool {
        for b in &pool {
            let ab = evaluator.evaluate(a, b);
            let ba = evaluator.evaluate(b, a);
            assert_eq!(ab.eligible, ba.eligible);
            assert_eq!(ab.score, ba.score);
            assert_eq!(ab.overlap, ba.overlap);
        }
    }
}

#[test]
fn test_entry_never_matches_itself() {
    let evaluator = CompatibilityEvaluator::default();
    let a = create_entry(26, Gender::NonBinary, GenderPreference::Any, (20, 40), vec![window(28, (18, 0), (20, 0))]);

    assert!(!evaluator.evaluate(&a, &a).eligible);
}

#[test]
fn test_longest_overlap_wins() {
    let a = vec![window(28, (12, 0), (13, 30)), window(29, (18, 0), (22, 0))];
    let b = vec![window(28, (12, 0), (14, 0)), window(29, (19, 0), (23, 0))];

    let best = best_overlap(&a, &b).unwrap();

    assert_eq!(best.date, NaiveDate::from_ymd_opt(2025, 12, 29).unwrap());
    assert_eq!(best.minutes(), 180);
}

#[test]
fn test_overlap_ties_prefer_earliest_slot() {
    let a = vec![window(29, (18, 0), (19, 0)), window(28, (20, 0), (21, 0))];
    let b = vec![window(28, (20, 0), (21, 0)), window(29, (18, 0), (19, 0))];

    let best = best_overlap(&a, &b).unwrap();

    assert_eq!(best.date, NaiveDate::from_ymd_opt(2025, 12, 28).unwrap());
    assert_eq!(best_overlap(&b, &a), Some(best));
}

#[test]
fn test_touching_windows_do_not_overlap() {
    assert!(window_overlap(&window(28, (18, 0), (19, 0)), &window(28, (19, 0), (20, 0))).is_none());
}

#[test]
fn test_window_must_start_before_end() {
    assert!(is_valid_window(&window(28, (18, 0), (19, 0))));
    assert!(!is_valid_window(&window(28, (19, 0), (19, 0))));
    assert!(!is_valid_window(&window(28, (22, 0), (1, 0))));
}

#[test]
fn test_score_prefers_longer_overlap() {
    let evaluator = CompatibilityEvaluator::default();
    let a = party_a();
    let b = party_b();
    let mut short = party_b();
    short.availability = vec![window(28, (19, 0), (20, 0))];
    short.enqueued_at = b.enqueued_at;

    let long_score = evaluator.evaluate(&a, &b).score;
    let short_score = evaluator.evaluate(&a, &short).score;

    assert!(long_score > short_score);
}

#[test]
fn test_score_stays_in_range() {
    let a = party_a();
    let mut b = party_b();
    b.enqueued_at = a.enqueued_at - Duration::days(365);
    let overlap = best_overlap(&a.availability, &b.availability);

    let score = calculate_match_score(&a, &b, overlap.as_ref(), &ScoringWeights::default(), Duration::minutes(180));

    assert!(score >= 0.0 && score <= 100.0, "Score {} is out of range [0, 100]", score);

    let none = calculate_match_score(&a, &b, None, &ScoringWeights::default(), Duration::minutes(180));
    assert!(none < score);
}
