pub mod hours;
pub mod resolver;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// A single day's working window.
///
/// `start == end == 00:00:00` denotes a closed day. `end < start` wraps past
/// midnight into the next civil day (e.g. 22:00–06:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Convenience constructor from whole hours, for defaults and tests.
    pub fn from_hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end_hour, 0, 0).unwrap(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.start == self.end && self.start == NaiveTime::MIN
    }

    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }
}

/// Weekly working schedule as an ordered Mon..Sun sequence.
///
/// Days are indexed by [`crate::date_util::weekday_index`]; an absent day is
/// closed. Kept as a fixed array rather than a keyed map so multi-day
/// interval walks are plain mod-7 arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeekSchedule {
    days: [Option<DayWindow>; 7],
}

impl WeekSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in fallback: 09:00–18:00 every day.
    pub fn default_hours() -> Self {
        let mut week = Self::new();
        for idx in 0..7 {
            week.set(idx, Some(DayWindow::from_hours(9, 18)));
        }
        week
    }

    /// Builder-style setter, used when assembling schedules in tests.
    pub fn with_day(mut self, index: usize, window: DayWindow) -> Self {
        self.set(index, Some(window));
        self
    }

    pub fn set(&mut self, index: usize, window: Option<DayWindow>) {
        self.days[index] = window;
    }

    /// Effective window for a weekday index. Closed days resolve to `None`.
    pub fn window(&self, index: usize) -> Option<DayWindow> {
        self.days[index].filter(|w| !w.is_closed())
    }

    /// True when no day carries an open window.
    pub fn is_empty(&self) -> bool {
        (0..7).all(|i| self.window(i).is_none())
    }
}

/// Provenance of a resolved schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleSource {
    #[serde(rename = "self")]
    User,
    #[serde(rename = "team")]
    Team,
    #[serde(rename = "org")]
    Org,
    #[serde(rename = "default")]
    Default,
}

impl ScheduleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleSource::User => "self",
            ScheduleSource::Team => "team",
            ScheduleSource::Org => "org",
            ScheduleSource::Default => "default",
        }
    }
}

/// Raw `working_hours` row as read from the schedule store. Weekday and time
/// fields stay unparsed here; the resolver owns validation so one bad field
/// drops a weekday instead of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub scope: String,
    pub scope_id: i64,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
}

/// A (user, team, org) principal binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBinding {
    pub user_id: i64,
    pub team_id: i64,
    pub org_id: i64,
}

/// The effective schedule selected for one principal.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSchedule {
    pub user_id: i64,
    pub team_id: i64,
    pub org_id: i64,
    pub source: ScheduleSource,
    pub week: WeekSchedule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_window() {
        let closed = DayWindow::from_hours(0, 0);
        assert!(closed.is_closed());
        assert!(!DayWindow::from_hours(9, 18).is_closed());
    }

    #[test]
    fn test_overnight_window() {
        assert!(DayWindow::from_hours(22, 6).is_overnight());
        assert!(!DayWindow::from_hours(9, 18).is_overnight());
    }

    #[test]
    fn test_window_hides_closed_days() {
        let week = WeekSchedule::new()
            .with_day(0, DayWindow::from_hours(9, 18))
            .with_day(1, DayWindow::from_hours(0, 0));
        assert!(week.window(0).is_some());
        assert!(week.window(1).is_none(), "00:00–00:00 must act as absent");
        assert!(week.window(2).is_none());
    }

    #[test]
    fn test_default_hours() {
        let week = WeekSchedule::default_hours();
        for idx in 0..7 {
            assert_eq!(week.window(idx), Some(DayWindow::from_hours(9, 18)));
        }
    }

    #[test]
    fn test_is_empty() {
        assert!(WeekSchedule::new().is_empty());
        assert!(!WeekSchedule::default_hours().is_empty());
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(ScheduleSource::User.as_str(), "self");
        assert_eq!(ScheduleSource::Default.as_str(), "default");
    }
}
