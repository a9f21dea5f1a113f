use chrono::Duration;

use crate::models::{AvailabilityOverlap, ScoringWeights, WaitingEntry};

/// Calculate a compatibility score (0-100) for a pair of entries
///
/// Scoring formula:
/// score = (
///     overlap_score * 0.70 +       # Longer shared availability = higher
///     wait_parity_score * 0.30     # Similar time in queue = higher
/// )
///
/// Both terms are symmetric in `a` and `b`.
pub fn calculate_match_score(
    a: &WaitingEntry,
    b: &WaitingEntry,
    overlap: Option<&AvailabilityOverlap>,
    weights: &ScoringWeights,
    saturation: Duration,
) -> f64 {
    let overlap_score = calculate_overlap_score(overlap.map_or(0, |o| o.minutes()), saturation);
    let parity_score = calculate_wait_parity_score(a, b);

    let total_score =
        (overlap_score * weights.overlap + parity_score * weights.wait_parity) * 100.0;

    total_score.min(100.0).max(0.0)
}

/// Calculate overlap score (0-1)
/// Grows linearly with shared minutes until `saturation`
#[inline]
fn calculate_overlap_score(overlap_minutes: i64, saturation: Duration) -> f64 {
    let saturation_minutes = saturation.num_minutes();
    if saturation_minutes <= 0 {
        return if overlap_minutes > 0 { 1.0 } else { 0.0 };
    }

    (overlap_minutes.max(0) as f64 / saturation_minutes as f64).min(1.0)
}

/// Calculate queue-wait parity score (0-1)
/// Entries enqueued close together score higher; a day apart scores 0.5
#[inline]
fn calculate_wait_parity_score(a: &WaitingEntry, b: &WaitingEntry) -> f64 {
    let gap_minutes = (a.enqueued_at - b.enqueued_at).num_minutes().abs() as f64;
    let gap_days = gap_minutes / (24.0 * 60.0);

    1.0 / (1.0 + gap_days)
}
