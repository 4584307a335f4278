use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::date_util::{civil, weekday_index};
use crate::schedule::WeekSchedule;

/// Seconds of `[t0, t1)` that fall inside the schedule's working windows.
///
/// All weekday and time-of-day decisions happen in `tz`, the schedule's
/// reference zone. Windows are half-open `[start, end)`; an overnight window
/// (`end < start`) wraps into the next civil day; closed and absent days
/// contribute nothing. The result is non-negative and never exceeds
/// `t1 - t0`.
pub fn working_seconds(t0: DateTime<Utc>, t1: DateTime<Utc>, sched: &WeekSchedule, tz: Tz) -> i64 {
    let l0 = civil(t0, tz);
    let l1 = civil(t1, tz);
    if l0 >= l1 {
        return 0;
    }

    // Walk civil days, starting one day early so an overnight window begun
    // the previous evening still covers the head of the interval.
    let mut clipped: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
    let mut day = l0.date().pred_opt().unwrap_or_else(|| l0.date());
    let last = l1.date();
    while day <= last {
        if let Some(w) = sched.window(weekday_index(day.weekday())) {
            let open = day.and_time(w.start);
            let close = match w.end.cmp(&w.start) {
                Ordering::Greater => day.and_time(w.end),
                Ordering::Less => match day.succ_opt() {
                    Some(next) => next.and_time(w.end),
                    None => break,
                },
                // Zero-length window (non-midnight start == end).
                Ordering::Equal => open,
            };

            let s = open.max(l0);
            let e = close.min(l1);
            if e > s {
                clipped.push((s, e));
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    // An overnight window can run into the next day's own window; merge so
    // no instant is counted twice.
    clipped.sort();
    let mut total = Duration::zero();
    let mut current: Option<(NaiveDateTime, NaiveDateTime)> = None;
    for (s, e) in clipped {
        match current {
            Some((cs, ce)) if s <= ce => current = Some((cs, ce.max(e))),
            Some((cs, ce)) => {
                total += ce - cs;
                current = Some((s, e));
            }
            None => current = Some((s, e)),
        }
    }
    if let Some((cs, ce)) = current {
        total += ce - cs;
    }
    total.num_seconds()
}

/// Compatibility fast path mirroring the original engine.
///
/// Same-civil-day intervals count their full span when strictly contained in
/// the day's window and zero when they cross either boundary; intervals
/// spanning civil days count zero.
pub fn working_seconds_simple(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    sched: &WeekSchedule,
    tz: Tz,
) -> i64 {
    let l0 = civil(t0, tz);
    let l1 = civil(t1, tz);
    if l0 >= l1 || l0.date() != l1.date() {
        return 0;
    }

    let day = l0.date();
    let Some(w) = sched.window(weekday_index(day.weekday())) else {
        return 0;
    };
    let open = day.and_time(w.start);
    let close = match w.end.cmp(&w.start) {
        Ordering::Greater => day.and_time(w.end),
        Ordering::Less => match day.succ_opt() {
            Some(next) => next.and_time(w.end),
            None => return 0,
        },
        Ordering::Equal => return 0,
    };

    if l0 >= open && l1 <= close {
        (l1 - l0).num_seconds()
    } else {
        0
    }
}

/// Mode-dispatching wrapper; `strict_same_day_containment` selects the
/// compatibility fast path.
pub fn working_seconds_with_mode(
    t0: DateTime<Utc>,
    t1: DateTime<Utc>,
    sched: &WeekSchedule,
    tz: Tz,
    strict_same_day_containment: bool,
) -> i64 {
    if strict_same_day_containment {
        working_seconds_simple(t0, t1, sched, tz)
    } else {
        working_seconds(t0, t1, sched, tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::DayWindow;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn weekdays_nine_to_six() -> WeekSchedule {
        let mut week = WeekSchedule::new();
        for idx in 0..5 {
            week.set(idx, Some(DayWindow::from_hours(9, 18)));
        }
        week
    }

    #[test]
    fn test_fully_within_day() {
        // Mon 10:00–10:05 inside Mon 09:00–18:00.
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 18));
        let secs = working_seconds(at(2025, 1, 6, 10, 0, 0), at(2025, 1, 6, 10, 5, 0), &sched, UTC);
        assert_eq!(secs, 300);
    }

    #[test]
    fn test_straddles_window_start() {
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 18));
        let t0 = at(2025, 1, 6, 8, 30, 0);
        let t1 = at(2025, 1, 6, 9, 30, 0);
        assert_eq!(working_seconds(t0, t1, &sched, UTC), 1800);
        assert_eq!(working_seconds_simple(t0, t1, &sched, UTC), 0);
    }

    #[test]
    fn test_closed_weekend_gap() {
        // Sat 10:00 → Mon 10:00 over a Mon–Fri week: one Monday hour.
        let sched = weekdays_nine_to_six();
        let secs = working_seconds(at(2025, 1, 4, 10, 0, 0), at(2025, 1, 6, 10, 0, 0), &sched, UTC);
        assert_eq!(secs, 3600);
    }

    #[test]
    fn test_overnight_window() {
        // Mon 22:00–06:00 wraps into Tuesday.
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(22, 6));
        let secs =
            working_seconds(at(2025, 1, 6, 23, 30, 0), at(2025, 1, 7, 2, 30, 0), &sched, UTC);
        assert_eq!(secs, 10800);
    }

    #[test]
    fn test_overnight_spillover_covers_interval_head() {
        // The interval starts Tuesday 01:00, inside Monday's overnight tail.
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(22, 6));
        let secs = working_seconds(at(2025, 1, 7, 1, 0, 0), at(2025, 1, 7, 8, 0, 0), &sched, UTC);
        assert_eq!(secs, 5 * 3600);
    }

    #[test]
    fn test_overnight_overlapping_next_window_not_double_counted() {
        // Monday wraps to 06:00 Tuesday; Tuesday opens at 05:00. The hour
        // 05:00–06:00 belongs to both windows but counts once.
        let sched = WeekSchedule::new()
            .with_day(0, DayWindow::from_hours(22, 6))
            .with_day(1, DayWindow::from_hours(5, 7));
        let t0 = at(2025, 1, 6, 22, 0, 0);
        let t1 = at(2025, 1, 7, 7, 0, 0);
        assert_eq!(working_seconds(t0, t1, &sched, UTC), 9 * 3600);
    }

    #[test]
    fn test_zero_when_reversed_or_empty() {
        let sched = weekdays_nine_to_six();
        let t = at(2025, 1, 6, 10, 0, 0);
        assert_eq!(working_seconds(t, t, &sched, UTC), 0);
        assert_eq!(working_seconds(at(2025, 1, 6, 11, 0, 0), t, &sched, UTC), 0);
    }

    #[test]
    fn test_closed_day_contributes_zero() {
        let sched = weekdays_nine_to_six();
        // Entirely within Saturday.
        let secs = working_seconds(at(2025, 1, 4, 9, 0, 0), at(2025, 1, 4, 18, 0, 0), &sched, UTC);
        assert_eq!(secs, 0);
    }

    #[test]
    fn test_end_boundary_excluded() {
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 18));
        // [17:59:00, 18:01:00) only counts up to 18:00.
        let secs =
            working_seconds(at(2025, 1, 6, 17, 59, 0), at(2025, 1, 6, 18, 1, 0), &sched, UTC);
        assert_eq!(secs, 60);
        // Consecutive full days do not double-count midnight.
        let all_day = WeekSchedule::new()
            .with_day(0, DayWindow::from_hours(0, 23))
            .with_day(1, DayWindow::from_hours(0, 23));
        let secs =
            working_seconds(at(2025, 1, 6, 0, 0, 0), at(2025, 1, 8, 0, 0, 0), &all_day, UTC);
        assert_eq!(secs, 2 * 23 * 3600);
    }

    #[test]
    fn test_multi_week_span() {
        // Two full Mon–Fri weeks at 9h/day.
        let sched = weekdays_nine_to_six();
        let secs = working_seconds(at(2025, 1, 6, 0, 0, 0), at(2025, 1, 20, 0, 0, 0), &sched, UTC);
        assert_eq!(secs, 10 * 9 * 3600);
    }

    #[test]
    fn test_monotonic_and_bounded() {
        let sched = weekdays_nine_to_six();
        let t0 = at(2025, 1, 3, 7, 0, 0);
        let mut prev = 0;
        for step in 0..40 {
            let t1 = t0 + Duration::hours(step * 3);
            let secs = working_seconds(t0, t1, &sched, UTC);
            assert!(secs >= prev, "monotonicity violated at step {step}");
            assert!(secs <= (t1 - t0).num_seconds(), "bound violated at step {step}");
            prev = secs;
        }
    }

    #[test]
    fn test_split_additivity() {
        let sched = WeekSchedule::new()
            .with_day(0, DayWindow::from_hours(22, 6))
            .with_day(1, DayWindow::from_hours(9, 18))
            .with_day(3, DayWindow::from_hours(0, 12));
        let t0 = at(2025, 1, 5, 15, 0, 0);
        let t1 = at(2025, 1, 10, 4, 0, 0);
        let total = working_seconds(t0, t1, &sched, UTC);
        for hours in [1, 7, 26, 50, 90] {
            let tm = t0 + Duration::hours(hours);
            let left = working_seconds(t0, tm, &sched, UTC);
            let right = working_seconds(tm, t1, &sched, UTC);
            assert_eq!(left + right, total, "split at +{hours}h");
        }
    }

    #[test]
    fn test_simple_mode_containment() {
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 18));
        // Contained: full span.
        let secs =
            working_seconds_simple(at(2025, 1, 6, 10, 0, 0), at(2025, 1, 6, 10, 5, 0), &sched, UTC);
        assert_eq!(secs, 300);
        // Crossing the end boundary: zero.
        let secs =
            working_seconds_simple(at(2025, 1, 6, 17, 0, 0), at(2025, 1, 6, 19, 0, 0), &sched, UTC);
        assert_eq!(secs, 0);
        // Cross-day: zero.
        let secs =
            working_seconds_simple(at(2025, 1, 6, 10, 0, 0), at(2025, 1, 7, 10, 0, 0), &sched, UTC);
        assert_eq!(secs, 0);
    }

    #[test]
    fn test_mode_dispatch() {
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 18));
        let t0 = at(2025, 1, 6, 8, 30, 0);
        let t1 = at(2025, 1, 6, 9, 30, 0);
        assert_eq!(working_seconds_with_mode(t0, t1, &sched, UTC, false), 1800);
        assert_eq!(working_seconds_with_mode(t0, t1, &sched, UTC, true), 0);
    }

    #[test]
    fn test_reference_zone_shifts_weekday() {
        // 2025-01-06T19:00Z is Monday in UTC but already Tuesday 00:30 in
        // Kolkata; with a Monday-only schedule the Kolkata reading sees
        // nothing.
        let sched = WeekSchedule::new().with_day(0, DayWindow::from_hours(9, 23));
        let t0 = at(2025, 1, 6, 19, 0, 0);
        let t1 = at(2025, 1, 6, 20, 0, 0);
        assert_eq!(working_seconds(t0, t1, &sched, UTC), 3600);
        assert_eq!(
            working_seconds(t0, t1, &sched, chrono_tz::Asia::Kolkata),
            0
        );
    }
}
