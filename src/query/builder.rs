use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::date_util::date_key;

/// A row from a daily performance report.
#[derive(Debug, Clone, Serialize)]
pub struct DailyReportRow {
    pub activity_date: String,
    pub user_id: i64,
    pub org_id: i64,
    pub contact_id: String,
    pub user_number: String,
    pub conversation_starter: String,
    pub last_message_from: String,
    pub contact_message_count: i64,
    pub agent_message_count: i64,
    pub unique_messages: i64,
    pub follow_up_count: i64,
    pub average_response_time: f64,
    pub time_to_first_response: Option<i64>,
}

/// Builder for daily-report queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct DailyReportQuery {
    user_id: Option<i64>,
    org_id: Option<i64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    limit: Option<u32>,
}

impl DailyReportQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn org(mut self, org_id: i64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fetch(&self, conn: &Connection) -> Result<Vec<DailyReportRow>, rusqlite::Error> {
        let mut clauses: Vec<String> = Vec::new();
        let mut binds: Vec<Value> = Vec::new();

        if let Some(user_id) = self.user_id {
            binds.push(Value::Integer(user_id));
            clauses.push(format!("user_id = ?{}", binds.len()));
        }
        if let Some(org_id) = self.org_id {
            binds.push(Value::Integer(org_id));
            clauses.push(format!("org_id = ?{}", binds.len()));
        }
        if let Some(start) = self.start_date {
            binds.push(Value::Text(date_key(start)));
            clauses.push(format!("activity_date >= ?{}", binds.len()));
        }
        if let Some(end) = self.end_date {
            binds.push(Value::Text(date_key(end)));
            clauses.push(format!("activity_date <= ?{}", binds.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit_clause = self
            .limit
            .map(|l| format!("LIMIT {l}"))
            .unwrap_or_default();

        let sql = format!(
            "SELECT activity_date, user_id, org_id, contact_id, user_number,
                    conversation_starter, last_message_from,
                    contact_message_count, agent_message_count,
                    unique_messages, follow_up_count,
                    average_response_time, time_to_first_response
             FROM daily_performance_summary
             {where_clause}
             ORDER BY activity_date, user_id, org_id, contact_id
             {limit_clause}"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds), |row| {
            Ok(DailyReportRow {
                activity_date: row.get(0)?,
                user_id: row.get(1)?,
                org_id: row.get(2)?,
                contact_id: row.get(3)?,
                user_number: row.get(4)?,
                conversation_starter: row.get(5)?,
                last_message_from: row.get(6)?,
                contact_message_count: row.get(7)?,
                agent_message_count: row.get(8)?,
                unique_messages: row.get(9)?,
                follow_up_count: row.get(10)?,
                average_response_time: row.get(11)?,
                time_to_first_response: row.get(12)?,
            })
        })?;
        rows.collect()
    }
}
