use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Index of a weekday in a Mon..Sun week, 0-based.
///
/// The mapping is tabulated explicitly rather than taken from a library
/// numbering so it cannot drift when the calendar crate changes encodings.
pub fn weekday_index(w: Weekday) -> usize {
    match w {
        Weekday::Mon => 0,
        Weekday::Tue => 1,
        Weekday::Wed => 2,
        Weekday::Thu => 3,
        Weekday::Fri => 4,
        Weekday::Sat => 5,
        Weekday::Sun => 6,
    }
}

/// Short lowercase names, index-aligned with [`weekday_index`].
pub const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Parse a `working_hours.weekday` value (`mon`..`sun`, case-insensitive).
pub fn parse_weekday(s: &str) -> Result<usize> {
    let lower = s.trim().to_lowercase();
    WEEKDAY_NAMES
        .iter()
        .position(|n| *n == lower)
        .ok_or_else(|| Error::ScheduleParse(format!("unknown weekday: {s}")))
}

/// Parse a wall-clock `HH:MM:SS` time.
pub fn parse_hms(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
        .map_err(|_| Error::ScheduleParse(format!("invalid time: {s}")))
}

/// Parse a timezone name (e.g. `UTC`, `Asia/Kolkata`).
pub fn parse_tz(s: &str) -> Result<Tz> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Config(format!("invalid timezone: {s}")))
}

/// Convert an absolute instant to civil (wall-clock) time in the given zone.
pub fn civil(t: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    t.with_timezone(&tz).naive_local()
}

/// Civil date of an instant in the given zone.
pub fn civil_date(t: DateTime<Utc>, tz: Tz) -> NaiveDate {
    civil(t, tz).date()
}

/// Format a civil date as the canonical `YYYY-MM-DD` key.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
