use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::events::{partition_by_chat, partition_by_day, MessageEvent};
use crate::job::retry::retry_store;
use crate::job::{JobOptions, JobProgress, JobReport, JobStatus};
use crate::metrics::{summarize_chat, summarize_day};
use crate::schedule::resolver::resolve_all;
use crate::schedule::{ResolvedSchedule, ScheduleEntry, UserBinding, WeekSchedule};
use crate::segment::segment;
use crate::storage::{repository, Database};
use crate::upsert::UpsertPlan;

/// Run the daily pipeline: events ingested inside the lookback window,
/// partitioned per (user, org, chat, civil day), merged into
/// `daily_performance_summary`.
pub async fn run_daily(
    db: &Database,
    options: &JobOptions,
    progress: &dyn JobProgress,
) -> Result<JobReport> {
    let job_key = "daily".to_string();
    let run_id = record_start(db, &job_key).await?;

    match daily_inner(db, &job_key, options, progress).await {
        Ok(report) => {
            record_finish(db, run_id, &report).await?;
            progress.on_complete(&report);
            Ok(report)
        }
        Err(e) => {
            record_failure(db, run_id, &e).await;
            Err(Error::Job {
                job_key,
                message: e.to_string(),
            })
        }
    }
}

/// Run the lifetime backfill pipeline for one user: every event of the
/// user's chats (optionally limited to one org), partitioned per
/// conversation, merged into `conversation_summary`.
pub async fn run_backfill(
    db: &Database,
    user_id: i64,
    org_id: Option<i64>,
    options: &JobOptions,
    progress: &dyn JobProgress,
) -> Result<JobReport> {
    let job_key = match org_id {
        Some(org) => format!("backfill:{user_id}:{org}"),
        None => format!("backfill:{user_id}"),
    };
    let run_id = record_start(db, &job_key).await?;

    match backfill_inner(db, &job_key, user_id, org_id, options, progress).await {
        Ok(report) => {
            record_finish(db, run_id, &report).await?;
            progress.on_complete(&report);
            Ok(report)
        }
        Err(e) => {
            record_failure(db, run_id, &e).await;
            Err(Error::Job {
                job_key,
                message: e.to_string(),
            })
        }
    }
}

async fn daily_inner(
    db: &Database,
    job_key: &str,
    options: &JobOptions,
    progress: &dyn JobProgress,
) -> Result<JobReport> {
    let schedules = resolve_schedules(db).await?;
    progress.on_schedules_resolved(schedules.len());

    let cutoff = Utc::now() - Duration::days(options.window_days as i64);
    let events = retry_store!(read_recent(db, cutoff))?;
    let events_read = events.len();
    progress.on_events_read(job_key, events_read);

    let partitions = partition_by_day(events, options.reference_tz);
    progress.on_partitions(job_key, partitions.len());

    let by_user: HashMap<i64, &ResolvedSchedule> =
        schedules.iter().map(|r| (r.user_id, r)).collect();
    let default_week = WeekSchedule::default_hours();
    let mut unknown_users: HashSet<i64> = HashSet::new();

    let mut rows = Vec::with_capacity(partitions.len());
    let mut response_pairs = 0usize;
    for (key, events) in &partitions {
        let week = match by_user.get(&key.user_id) {
            Some(resolved) => &resolved.week,
            None => {
                unknown_users.insert(key.user_id);
                &default_week
            }
        };
        let stats = segment(events);
        response_pairs += stats.response_pairs.len();
        rows.push(summarize_day(
            key,
            &stats,
            week,
            options.reference_tz,
            options.strict_same_day_containment,
        ));
    }
    if !unknown_users.is_empty() {
        log::warn!(
            "{} users have events but no binding; default schedule applied",
            unknown_users.len()
        );
    }

    let plan = UpsertPlan::daily(&rows, Utc::now());
    let rows_upserted = retry_store!(execute_plan(db, plan.clone()))?;
    progress.on_rows_upserted(plan.table.name(), rows_upserted);

    Ok(JobReport {
        job_key: job_key.to_string(),
        status: JobStatus::Success,
        schedules_resolved: schedules.len(),
        events_read,
        partitions: partitions.len(),
        response_pairs,
        rows_upserted,
        error: None,
    })
}

async fn backfill_inner(
    db: &Database,
    job_key: &str,
    user_id: i64,
    org_id: Option<i64>,
    options: &JobOptions,
    progress: &dyn JobProgress,
) -> Result<JobReport> {
    let schedules = resolve_schedules(db).await?;
    progress.on_schedules_resolved(schedules.len());

    let week = match schedules.iter().find(|r| r.user_id == user_id) {
        Some(resolved) => resolved.week.clone(),
        None => {
            log::warn!("user {user_id} has no binding; default schedule applied");
            WeekSchedule::default_hours()
        }
    };

    let mut events = retry_store!(read_user_events(db, user_id))?;
    if let Some(org) = org_id {
        events.retain(|e| e.org_id == org);
    }
    let events_read = events.len();
    progress.on_events_read(job_key, events_read);

    let partitions = partition_by_chat(events);
    progress.on_partitions(job_key, partitions.len());

    let mut rows = Vec::with_capacity(partitions.len());
    let mut response_pairs = 0usize;
    for (key, events) in &partitions {
        let stats = segment(events);
        response_pairs += stats.response_pairs.len();
        // Partitions are never empty; the fallback start never fires.
        let conversation_start = events
            .first()
            .map(|e| e.message_timestamp)
            .unwrap_or_else(Utc::now);
        rows.push(summarize_chat(
            key,
            &stats,
            conversation_start,
            &week,
            options.reference_tz,
            options.strict_same_day_containment,
        ));
    }

    let plan = UpsertPlan::conversation(&rows, Utc::now());
    let rows_upserted = retry_store!(execute_plan(db, plan.clone()))?;
    progress.on_rows_upserted(plan.table.name(), rows_upserted);

    Ok(JobReport {
        job_key: job_key.to_string(),
        status: JobStatus::Success,
        schedules_resolved: schedules.len(),
        events_read,
        partitions: partitions.len(),
        response_pairs,
        rows_upserted,
        error: None,
    })
}

/// Read the schedule store and resolve every principal. Schedules are read
/// fresh each run.
pub async fn resolve_schedules(db: &Database) -> Result<Vec<ResolvedSchedule>> {
    let (entries, bindings) = retry_store!(read_schedule_inputs(db))?;
    Ok(resolve_all(&entries, &bindings))
}

async fn read_schedule_inputs(
    db: &Database,
) -> Result<(Vec<ScheduleEntry>, Vec<UserBinding>)> {
    db.reader()
        .call(|conn| {
            let entries = repository::list_working_hours(conn)?;
            let bindings = repository::list_user_bindings(conn)?;
            Ok::<_, tokio_rusqlite::Error>((entries, bindings))
        })
        .await
        .map_err(Into::into)
}

async fn read_recent(db: &Database, cutoff: DateTime<Utc>) -> Result<Vec<MessageEvent>> {
    db.reader()
        .call(move |conn| Ok(repository::recent_events(conn, cutoff)?))
        .await
        .map_err(Into::into)
}

async fn read_user_events(db: &Database, user_id: i64) -> Result<Vec<MessageEvent>> {
    db.reader()
        .call(move |conn| Ok(repository::events_for_user(conn, user_id)?))
        .await
        .map_err(Into::into)
}

/// Apply a plan. Classification happens on the typed rusqlite error inside
/// the call, before it is stringified: store rejections become fatal
/// `Upsert` errors, anything else stays a retryable `Database` error.
async fn execute_plan(db: &Database, plan: UpsertPlan) -> Result<usize> {
    db.writer()
        .call(move |conn| {
            Ok::<_, tokio_rusqlite::Error>(plan.execute(conn).map_err(classify_store_error))
        })
        .await?
}

/// Only a SQLite constraint violation is an upsert rejection.
fn classify_store_error(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Upsert(e.to_string())
        }
        _ => Error::Database(e.to_string()),
    }
}

async fn record_start(db: &Database, job_key: &str) -> Result<i64> {
    let job_key = job_key.to_string();
    db.writer()
        .call(move |conn| Ok(repository::insert_job_run(conn, &job_key)?))
        .await
        .map_err(Into::into)
}

async fn record_finish(db: &Database, run_id: i64, report: &JobReport) -> Result<()> {
    let events_read = report.events_read as u64;
    let rows_upserted = report.rows_upserted as u64;
    db.writer()
        .call(move |conn| {
            Ok(repository::finish_job_run(
                conn,
                run_id,
                "completed",
                events_read,
                rows_upserted,
                None,
            )?)
        })
        .await
        .map_err(Into::into)
}

async fn record_failure(db: &Database, run_id: i64, error: &Error) {
    let message = error.to_string();
    let result = db
        .writer()
        .call(move |conn| {
            Ok(repository::finish_job_run(
                conn, run_id, "failed", 0, 0, Some(&message),
            )?)
        })
        .await;
    if let Err(e) = result {
        log::error!("Failed to record job failure: {e}");
    }
}
