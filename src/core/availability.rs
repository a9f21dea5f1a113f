use crate::models::{AvailabilityOverlap, AvailabilityWindow};
use std::cmp::Ordering;

/// A window is usable when it ends after it starts on the same day
#[inline]
pub fn is_valid_window(window: &AvailabilityWindow) -> bool {
    window.start < window.end
}

/// Intersection of two windows on the same date, if any
///
/// # Returns
/// `None` when the windows are on different dates or only touch at an edge
#[inline]
pub fn window_overlap(a: &AvailabilityWindow, b: &AvailabilityWindow) -> Option<AvailabilityOverlap> {
    if a.date != b.date {
        return None;
    }

    let start = a.start.max(b.start);
    let end = a.end.min(b.end);

    if start < end {
        Some(AvailabilityOverlap {
            date: a.date,
            start,
            end,
        })
    } else {
        None
    }
}

/// Longest overlap across every pair of windows
///
/// Ties prefer the earliest date, then the earliest start, so the result is
/// the same whichever side is passed first.
pub fn best_overlap(a: &[AvailabilityWindow], b: &[AvailabilityWindow]) -> Option<AvailabilityOverlap> {
    a.iter()
        .flat_map(|wa| b.iter().filter_map(move |wb| window_overlap(wa, wb)))
        .max_by(compare_overlaps)
}

fn compare_overlaps(x: &AvailabilityOverlap, y: &AvailabilityOverlap) -> Ordering {
    x.minutes()
        .cmp(&y.minutes())
        .then_with(|| y.date.cmp(&x.date))
        .then_with(|| y.start.cmp(&x.start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn window(day: u32, start_h: u32, end_h: u32) -> AvailabilityWindow {
        AvailabilityWindow::new(
            NaiveDate::from_ymd_opt(2025, 12, day).unwrap(),
            NaiveTime::from_hms_opt(start_h, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(end_h, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_same_window_overlaps_fully() {
        let overlap = window_overlap(&window(28, 18, 20), &window(28, 18, 20)).unwrap();
        assert_eq!(overlap.minutes(), 120);
    }

    #[test]
    fn test_different_dates_do_not_overlap() {
        assert!(window_overlap(&window(28, 18, 20), &window(29, 19, 21)).is_none());
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        assert!(window_overlap(&window(28, 16, 18), &window(28, 18, 20)).is_none());
    }

    #[test]
    fn test_best_overlap_picks_longest() {
        let a = vec![window(27, 12, 13), window(28, 17, 21)];
        let b = vec![window(27, 12, 14), window(28, 18, 22)];

        let best = best_overlap(&a, &b).unwrap();

        assert_eq!(best.date, NaiveDate::from_ymd_opt(2025, 12, 28).unwrap());
        assert_eq!(best.minutes(), 180);
    }

    #[test]
    fn test_best_overlap_tie_prefers_earliest() {
        let a = vec![window(29, 18, 20), window(28, 18, 20)];
        let b = vec![window(28, 18, 20), window(29, 18, 20)];

        let forward = best_overlap(&a, &b).unwrap();
        let backward = best_overlap(&b, &a).unwrap();

        assert_eq!(forward.date, NaiveDate::from_ymd_opt(2025, 12, 28).unwrap());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_invalid_window() {
        assert!(!is_valid_window(&window(28, 20, 18)));
        assert!(is_valid_window(&window(28, 18, 20)));
    }
}
