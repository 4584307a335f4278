use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::events::{Direction, MessageEvent};
use crate::schedule::{ScheduleEntry, UserBinding};

/// Canonical timestamp format for every store column; matches SQLite's
/// `datetime('now')` so text comparison orders correctly.
pub fn fmt_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_direction(s: &str) -> Result<Direction, rusqlite::Error> {
    Direction::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ── Working hours ──────────────────────────────────────────────────

pub fn upsert_working_hours(
    conn: &Connection,
    entry: &ScheduleEntry,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO working_hours (
            scope, scope_id, weekday, start_time_utc, end_time_utc
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.scope,
            entry.scope_id,
            entry.weekday,
            entry.start_time,
            entry.end_time,
        ],
    )?;
    Ok(())
}

/// Full scan; the schedule set is small and read fresh each run.
pub fn list_working_hours(conn: &Connection) -> Result<Vec<ScheduleEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT scope, scope_id, weekday, start_time_utc, end_time_utc
         FROM working_hours ORDER BY scope, scope_id, weekday",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ScheduleEntry {
            scope: row.get(0)?,
            scope_id: row.get(1)?,
            weekday: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
        })
    })?;
    rows.collect()
}

// ── User bindings ──────────────────────────────────────────────────

pub fn insert_user_binding(
    conn: &Connection,
    binding: &UserBinding,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO user_bindings (user_id, team_id, org_id) VALUES (?1, ?2, ?3)",
        params![binding.user_id, binding.team_id, binding.org_id],
    )?;
    Ok(())
}

/// Full scan in insertion order; the resolver deduplicates by user_id with
/// the first row winning, so order matters here.
pub fn list_user_bindings(conn: &Connection) -> Result<Vec<UserBinding>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT user_id, team_id, org_id FROM user_bindings ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok(UserBinding {
            user_id: row.get(0)?,
            team_id: row.get(1)?,
            org_id: row.get(2)?,
        })
    })?;
    rows.collect()
}

// ── Message events ─────────────────────────────────────────────────

/// Events are append-only; re-ingesting an existing event id is a no-op.
pub fn insert_message_event(
    conn: &Connection,
    event: &MessageEvent,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO message_events (
            event_id, message_id, chat_id, user_id, org_id,
            agent_phone_number, sender_number, direction,
            message_timestamp, ingestion_timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.event_id,
            event.message_id,
            event.chat_id,
            event.user_id,
            event.org_id,
            event.agent_phone_number,
            event.sender_number,
            event.direction.as_str(),
            fmt_ts(event.message_timestamp),
            fmt_ts(event.ingestion_timestamp),
        ],
    )?;
    Ok(())
}

const EVENT_COLUMNS: &str = "event_id, message_id, chat_id, user_id, org_id, \
     agent_phone_number, sender_number, direction, message_timestamp, ingestion_timestamp";

fn event_from_row(row: &rusqlite::Row) -> Result<MessageEvent, rusqlite::Error> {
    let direction: String = row.get(7)?;
    let message_ts: String = row.get(8)?;
    let ingestion_ts: String = row.get(9)?;
    Ok(MessageEvent {
        event_id: row.get(0)?,
        message_id: row.get(1)?,
        chat_id: row.get(2)?,
        user_id: row.get(3)?,
        org_id: row.get(4)?,
        agent_phone_number: row.get(5)?,
        sender_number: row.get(6)?,
        direction: parse_direction(&direction)?,
        message_timestamp: parse_ts(&message_ts)?,
        ingestion_timestamp: parse_ts(&ingestion_ts)?,
    })
}

/// Events ingested at or after `cutoff`, in `(chat_id, message_timestamp,
/// event_id)` order, the order every downstream stage assumes.
pub fn recent_events(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<MessageEvent>, rusqlite::Error> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM message_events
         WHERE ingestion_timestamp >= ?1
         ORDER BY chat_id, message_timestamp, event_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_ts(cutoff)], |row| event_from_row(row))?;
    rows.collect()
}

/// All events for one user, for the lifetime backfill pipeline.
pub fn events_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<MessageEvent>, rusqlite::Error> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM message_events
         WHERE user_id = ?1
         ORDER BY chat_id, message_timestamp, event_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], |row| event_from_row(row))?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Job runs ───────────────────────────────────────────────────────

pub fn insert_job_run(conn: &Connection, job_key: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO job_runs (job_key, status, started_at)
         VALUES (?1, 'running', datetime('now'))",
        params![job_key],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_job_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    events_read: u64,
    rows_upserted: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE job_runs SET
            status = ?2, completed_at = datetime('now'),
            events_read = ?3, rows_upserted = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            run_id,
            status,
            events_read as i64,
            rows_upserted as i64,
            error_message,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::event;
    use crate::events::Direction::{Incoming as IN, Outgoing as OUT};
    use crate::storage::Database;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "reference_tz", "Asia/Kolkata")?;
                let val = get_config(conn, "reference_tz")?;
                assert_eq!(val, Some("Asia/Kolkata".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_working_hours_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let entry = ScheduleEntry {
                    scope: "team".to_string(),
                    scope_id: 9,
                    weekday: "mon".to_string(),
                    start_time: "09:00:00".to_string(),
                    end_time: "18:00:00".to_string(),
                };
                upsert_working_hours(conn, &entry)?;
                // Replacing the same (scope, scope_id, weekday) key keeps one row.
                upsert_working_hours(conn, &entry)?;

                let entries = list_working_hours(conn)?;
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].scope, "team");
                assert_eq!(entries[0].start_time, "09:00:00");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bindings_keep_insertion_order() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                insert_user_binding(
                    conn,
                    &UserBinding { user_id: 1, team_id: 9, org_id: 2 },
                )?;
                insert_user_binding(
                    conn,
                    &UserBinding { user_id: 1, team_id: 50, org_id: 3 },
                )?;

                let bindings = list_user_bindings(conn)?;
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].team_id, 9, "first binding must come back first");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_event_round_trip_and_order() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                // Inserted out of order on purpose.
                insert_message_event(conn, &event(3, "b", IN, (2025, 1, 6, 9, 1, 0)))?;
                insert_message_event(conn, &event(2, "a", OUT, (2025, 1, 6, 9, 5, 0)))?;
                insert_message_event(conn, &event(1, "a", IN, (2025, 1, 6, 9, 0, 0)))?;

                let cutoff = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
                let events = recent_events(conn, cutoff)?;
                assert_eq!(
                    events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
                    vec![1, 2, 3]
                );
                assert_eq!(events[0].direction, IN);
                assert_eq!(
                    events[0].message_timestamp,
                    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
                );
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recent_events_respects_cutoff() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut old = event(1, "a", IN, (2025, 1, 6, 9, 0, 0));
                old.ingestion_timestamp = old.ingestion_timestamp - Duration::days(10);
                insert_message_event(conn, &old)?;
                insert_message_event(conn, &event(2, "a", OUT, (2025, 1, 6, 9, 5, 0)))?;

                let cutoff = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
                let events = recent_events(conn, cutoff)?;
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].event_id, 2);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_events_for_user() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut other = event(1, "a", IN, (2025, 1, 6, 9, 0, 0));
                other.user_id = 99;
                insert_message_event(conn, &other)?;
                insert_message_event(conn, &event(2, "a", OUT, (2025, 1, 6, 9, 5, 0)))?;

                let events = events_for_user(conn, 1)?;
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].event_id, 2);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_job_run_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let run_id = insert_job_run(conn, "daily")?;
                assert!(run_id > 0);
                finish_job_run(conn, run_id, "completed", 42, 7, None)?;

                let status: String = conn.query_row(
                    "SELECT status FROM job_runs WHERE id = ?1",
                    params![run_id],
                    |row| row.get(0),
                )?;
                assert_eq!(status, "completed");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_ts_round_trip() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 15).unwrap();
        assert_eq!(fmt_ts(t), "2025-01-06 09:30:15");
        assert_eq!(parse_ts("2025-01-06 09:30:15").unwrap(), t);
        assert!(parse_ts("2025-01-06T09:30:15Z").is_err());
    }
}
