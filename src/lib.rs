pub mod date_util;
pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod query;
pub mod schedule;
pub mod segment;
pub mod storage;
pub mod upsert;

pub use error::{Error, Result};
pub use events::{Direction, MessageEvent};
pub use job::{JobOptions, JobProgress, JobReport, JobStatus, NoopProgress};
pub use metrics::{ConversationSummaryRow, DailySummaryRow};
pub use query::builder::{DailyReportQuery, DailyReportRow};
pub use query::period::Period;
pub use schedule::{ResolvedSchedule, ScheduleSource, WeekSchedule};
pub use storage::Database;

use std::io::BufRead;

use schedule::{resolver, ScheduleEntry, UserBinding};
use storage::repository;

/// Main entry point for the chat analytics warehouse.
pub struct ChatDW {
    db: Database,
}

impl ChatDW {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Jobs ───────────────────────────────────────────────────────

    pub async fn run_daily(
        &self,
        options: &JobOptions,
        progress: &dyn JobProgress,
    ) -> Result<JobReport> {
        job::runner::run_daily(&self.db, options, progress).await
    }

    pub async fn run_backfill(
        &self,
        user_id: i64,
        org_id: Option<i64>,
        options: &JobOptions,
        progress: &dyn JobProgress,
    ) -> Result<JobReport> {
        job::runner::run_backfill(&self.db, user_id, org_id, options, progress).await
    }

    /// Job options seeded from the config store. Environment variables and
    /// CLI flags override these in the binary.
    pub async fn job_options(&self) -> Result<JobOptions> {
        let mut options = JobOptions::default();
        if let Some(days) = self.config_get("window_days").await? {
            options.window_days = days
                .parse()
                .map_err(|_| Error::Config(format!("invalid window_days: {days}")))?;
        }
        if let Some(tz) = self.config_get("reference_tz").await? {
            options.reference_tz = date_util::parse_tz(&tz)?;
        }
        Ok(options)
    }

    // ── Schedules ──────────────────────────────────────────────────

    /// Resolve every principal's effective schedule.
    pub async fn resolved_schedules(&self) -> Result<Vec<ResolvedSchedule>> {
        job::runner::resolve_schedules(&self.db).await
    }

    /// Resolve one principal's effective schedule. Fails with `NotFound`
    /// when the user has no binding row.
    pub async fn resolved_schedule(&self, user_id: i64) -> Result<ResolvedSchedule> {
        let (entries, bindings) = self
            .db
            .reader()
            .call(|conn| {
                let entries = repository::list_working_hours(conn)?;
                let bindings = repository::list_user_bindings(conn)?;
                Ok::<_, tokio_rusqlite::Error>((entries, bindings))
            })
            .await?;

        // First binding wins, mirroring resolve_all's deduplication.
        let binding = bindings
            .iter()
            .find(|b| b.user_id == user_id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("no binding for user {user_id}")))?;
        Ok(resolver::resolve_one(&entries, binding))
    }

    // ── Loaders ────────────────────────────────────────────────────

    /// Load message events from JSON lines. Unparseable lines are logged
    /// and skipped; the count of ingested events is returned.
    pub async fn load_events(&self, input: impl BufRead) -> Result<usize> {
        let events: Vec<MessageEvent> = parse_jsonl(input, "event")?;
        let count = events.len();
        self.db
            .writer()
            .call(move |conn| {
                for event in &events {
                    repository::insert_message_event(conn, event)?;
                }
                Ok::<(), tokio_rusqlite::Error>(())
            })
            .await?;
        Ok(count)
    }

    /// Load schedule rows from JSON lines.
    pub async fn load_schedules(&self, input: impl BufRead) -> Result<usize> {
        let entries: Vec<ScheduleEntry> = parse_jsonl(input, "schedule")?;
        let count = entries.len();
        self.db
            .writer()
            .call(move |conn| {
                for entry in &entries {
                    repository::upsert_working_hours(conn, entry)?;
                }
                Ok::<(), tokio_rusqlite::Error>(())
            })
            .await?;
        Ok(count)
    }

    /// Load user bindings from JSON lines.
    pub async fn load_bindings(&self, input: impl BufRead) -> Result<usize> {
        let bindings: Vec<UserBinding> = parse_jsonl(input, "binding")?;
        let count = bindings.len();
        self.db
            .writer()
            .call(move |conn| {
                for binding in &bindings {
                    repository::insert_user_binding(conn, binding)?;
                }
                Ok::<(), tokio_rusqlite::Error>(())
            })
            .await?;
        Ok(count)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| Ok(repository::get_config(conn, &key)?)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| Ok(repository::set_config(conn, &key, &value)?)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| Ok(repository::list_config(conn)?))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Parse one JSON value per line, logging and skipping bad lines.
fn parse_jsonl<T: serde::de::DeserializeOwned>(
    input: impl BufRead,
    what: &str,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for (lineno, line) in input.lines().enumerate() {
        let line = line.map_err(|e| Error::Other(format!("read error: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(item) => items.push(item),
            Err(e) => log::warn!("Skipping bad {what} on line {}: {e}", lineno + 1),
        }
    }
    Ok(items)
}
