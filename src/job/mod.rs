pub mod retry;
pub mod runner;

use chrono_tz::Tz;
use serde::Serialize;

/// Options controlling one analytics run.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Daily-pipeline lookback: events ingested within the last `window_days`.
    pub window_days: u32,
    /// Select the compatibility fast path for working-time arithmetic.
    pub strict_same_day_containment: bool,
    /// Reference zone for weekday and time-of-day decisions.
    pub reference_tz: Tz,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            window_days: 1,
            strict_same_day_containment: false,
            reference_tz: chrono_tz::UTC,
        }
    }
}

/// Progress callbacks during a run. All methods default to no-ops so
/// consumers only override what they display; library users who don't need
/// progress pass `&NoopProgress`.
pub trait JobProgress: Send + Sync {
    fn on_schedules_resolved(&self, _count: usize) {}
    fn on_events_read(&self, _job_key: &str, _count: usize) {}
    fn on_partitions(&self, _job_key: &str, _count: usize) {}
    fn on_rows_upserted(&self, _table: &str, _count: usize) {}
    fn on_complete(&self, _report: &JobReport) {}
}

/// No-op implementation of `JobProgress`.
pub struct NoopProgress;
impl JobProgress for NoopProgress {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Failed,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_key: String,
    pub status: JobStatus,
    pub schedules_resolved: usize,
    pub events_read: usize,
    pub partitions: usize,
    pub response_pairs: usize,
    pub rows_upserted: usize,
    pub error: Option<String>,
}

