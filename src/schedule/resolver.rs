use std::collections::HashSet;

use crate::date_util::{parse_hms, parse_weekday};
use crate::schedule::{
    DayWindow, ResolvedSchedule, ScheduleEntry, ScheduleSource, UserBinding, WeekSchedule,
};

/// Resolve effective schedules for a set of principals.
///
/// Scope priority is `self > team > org > default`, applied per principal:
/// the highest-priority scope holding ANY entries for the principal supplies
/// the whole week, and lower scopes are ignored entirely. Bindings are
/// deduplicated by `user_id`; the first row encountered wins.
pub fn resolve_all(entries: &[ScheduleEntry], bindings: &[UserBinding]) -> Vec<ResolvedSchedule> {
    let mut seen = HashSet::new();
    let resolved: Vec<ResolvedSchedule> = bindings
        .iter()
        .filter(|b| seen.insert(b.user_id))
        .map(|b| resolve_one(entries, *b))
        .collect();

    warn_orphan_entries(entries, bindings);
    resolved
}

/// Resolve the effective schedule for a single principal.
pub fn resolve_one(entries: &[ScheduleEntry], binding: UserBinding) -> ResolvedSchedule {
    let candidates = [
        (ScheduleSource::User, "self", binding.user_id),
        (ScheduleSource::Team, "team", binding.team_id),
        (ScheduleSource::Org, "org", binding.org_id),
    ];

    for (source, scope, scope_id) in candidates {
        let rows: Vec<&ScheduleEntry> = entries
            .iter()
            .filter(|e| e.scope == scope && e.scope_id == scope_id)
            .collect();
        if !rows.is_empty() {
            return ResolvedSchedule {
                user_id: binding.user_id,
                team_id: binding.team_id,
                org_id: binding.org_id,
                source,
                week: build_week(&rows),
            };
        }
    }

    ResolvedSchedule {
        user_id: binding.user_id,
        team_id: binding.team_id,
        org_id: binding.org_id,
        source: ScheduleSource::Default,
        week: WeekSchedule::default_hours(),
    }
}

/// Assemble a week from one scope's rows. A row whose weekday or times fail
/// to parse drops that weekday with a warning instead of failing the run. A
/// 00:00:00–00:00:00 row marks the day closed; an end before the start is an
/// overnight window wrapping past midnight.
fn build_week(rows: &[&ScheduleEntry]) -> WeekSchedule {
    let mut week = WeekSchedule::new();
    for row in rows {
        let idx = match parse_weekday(&row.weekday) {
            Ok(idx) => idx,
            Err(e) => {
                log::warn!(
                    "Skipping working_hours row for {}:{}: {e}",
                    row.scope,
                    row.scope_id
                );
                continue;
            }
        };
        let window = match (parse_hms(&row.start_time), parse_hms(&row.end_time)) {
            (Ok(start), Ok(end)) => DayWindow::new(start, end),
            (start, end) => {
                let e = start.err().or(end.err()).unwrap();
                log::warn!(
                    "Skipping {} window for {}:{}: {e}",
                    row.weekday,
                    row.scope,
                    row.scope_id
                );
                continue;
            }
        };
        week.set(idx, Some(window));
    }
    week
}

/// Log schedule rows whose (scope, scope_id) matches no known principal.
/// Contained data-quality issue: the rows are skipped, never fatal.
fn warn_orphan_entries(entries: &[ScheduleEntry], bindings: &[UserBinding]) {
    let mut referenced: HashSet<(&str, i64)> = HashSet::new();
    for b in bindings {
        referenced.insert(("self", b.user_id));
        referenced.insert(("team", b.team_id));
        referenced.insert(("org", b.org_id));
    }

    let orphans = entries
        .iter()
        .filter(|e| !referenced.contains(&(e.scope.as_str(), e.scope_id)))
        .count();
    if orphans > 0 {
        log::warn!("{orphans} working_hours rows match no known principal; skipped");
    }
}
