use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::date_util::date_key;
use crate::metrics::{ConversationSummaryRow, DailySummaryRow};

/// Target aggregate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTable {
    ConversationSummary,
    DailyPerformanceSummary,
}

impl TargetTable {
    pub fn name(&self) -> &'static str {
        match self {
            TargetTable::ConversationSummary => "conversation_summary",
            TargetTable::DailyPerformanceSummary => "daily_performance_summary",
        }
    }

    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            TargetTable::ConversationSummary => &["uid", "org_id", "chat_id", "phone_number"],
            TargetTable::DailyPerformanceSummary => {
                &["activity_date", "user_id", "org_id", "contact_id", "user_number"]
            }
        }
    }

    /// Analytics columns overwritten on every merge.
    pub fn value_columns(&self) -> &'static [&'static str] {
        &[
            "conversation_starter",
            "last_message_from",
            "contact_message_count",
            "agent_message_count",
            "unique_messages",
            "follow_up_count",
            "average_response_time",
            "time_to_first_response",
        ]
    }
}

/// One planned merge row: key cells, analytics cells, and the `created_at`
/// used only when the row does not exist yet.
#[derive(Debug, Clone)]
pub struct PlannedRow {
    pub key: Vec<Value>,
    pub values: Vec<Value>,
    pub created_at: Value,
}

/// A deterministic, idempotent merge plan for one target table.
///
/// MATCHED rows get every analytics column and `updated_at` overwritten;
/// `created_at` is never touched. NOT MATCHED rows are inserted with the
/// planned `created_at` and `updated_at = now`. Rows are ordered by key, so
/// two plans built from the same inputs and the same `now` are identical.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub table: TargetTable,
    pub updated_at: Value,
    pub rows: Vec<PlannedRow>,
}

fn opt_i64(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn ts(t: DateTime<Utc>) -> Value {
    Value::Text(t.format("%Y-%m-%d %H:%M:%S").to_string())
}

impl UpsertPlan {
    /// Plan lifetime-aggregate merges. New rows are created at the
    /// conversation's first message timestamp.
    pub fn conversation(rows: &[ConversationSummaryRow], now: DateTime<Utc>) -> Self {
        let mut rows: Vec<&ConversationSummaryRow> = rows.iter().collect();
        rows.sort_by(|a, b| {
            (a.user_id, a.org_id, &a.chat_id, &a.phone_number)
                .cmp(&(b.user_id, b.org_id, &b.chat_id, &b.phone_number))
        });

        let planned = rows
            .into_iter()
            .map(|r| PlannedRow {
                key: vec![
                    Value::Integer(r.user_id),
                    Value::Integer(r.org_id),
                    Value::Text(r.chat_id.clone()),
                    Value::Text(r.phone_number.clone()),
                ],
                values: analytics_cells(
                    &r.conversation_starter,
                    &r.last_message_from,
                    r.contact_message_count,
                    r.agent_message_count,
                    r.unique_messages,
                    r.follow_up_count,
                    r.average_response_time,
                    r.time_to_first_response,
                ),
                created_at: ts(r.conversation_start),
            })
            .collect();

        Self {
            table: TargetTable::ConversationSummary,
            updated_at: ts(now),
            rows: planned,
        }
    }

    /// Plan daily-aggregate merges. New rows are created at `now`.
    pub fn daily(rows: &[DailySummaryRow], now: DateTime<Utc>) -> Self {
        let mut rows: Vec<&DailySummaryRow> = rows.iter().collect();
        rows.sort_by(|a, b| {
            (a.activity_date, a.user_id, a.org_id, &a.chat_id, &a.phone_number)
                .cmp(&(b.activity_date, b.user_id, b.org_id, &b.chat_id, &b.phone_number))
        });

        let planned = rows
            .into_iter()
            .map(|r| PlannedRow {
                key: vec![
                    Value::Text(date_key(r.activity_date)),
                    Value::Integer(r.user_id),
                    Value::Integer(r.org_id),
                    Value::Text(r.chat_id.clone()),
                    Value::Text(r.phone_number.clone()),
                ],
                values: analytics_cells(
                    &r.conversation_starter,
                    &r.last_message_from,
                    r.contact_message_count,
                    r.agent_message_count,
                    r.unique_messages,
                    r.follow_up_count,
                    r.average_response_time,
                    r.time_to_first_response,
                ),
                created_at: ts(now),
            })
            .collect();

        Self {
            table: TargetTable::DailyPerformanceSummary,
            updated_at: ts(now),
            rows: planned,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The merge statement all rows of this plan run through.
    pub fn merge_sql(&self) -> String {
        let keys = self.table.key_columns();
        let values = self.table.value_columns();

        let columns: Vec<&str> = keys
            .iter()
            .chain(values.iter())
            .copied()
            .chain(["created_at", "updated_at"])
            .collect();
        let placeholders: Vec<String> =
            (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = values
            .iter()
            .map(|c| format!("{c}=excluded.{c}"))
            .chain(["updated_at=excluded.updated_at".to_string()])
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.table.name(),
            columns.join(", "),
            placeholders.join(", "),
            keys.join(", "),
            updates.join(", "),
        )
    }

    /// Apply the plan inside one transaction. Either every row of the plan
    /// lands or none do; re-running an identical plan is a no-op row-wise.
    pub fn execute(&self, conn: &mut Connection) -> rusqlite::Result<usize> {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&self.merge_sql())?;
            for row in &self.rows {
                let cells = row
                    .key
                    .iter()
                    .chain(row.values.iter())
                    .chain([&row.created_at, &self.updated_at])
                    .cloned();
                stmt.execute(params_from_iter(cells))?;
            }
        }
        tx.commit()?;
        Ok(self.rows.len())
    }
}

#[allow(clippy::too_many_arguments)]
fn analytics_cells(
    starter: &str,
    closer: &str,
    contact_count: i64,
    agent_count: i64,
    unique_messages: i64,
    follow_ups: i64,
    average_response_time: f64,
    time_to_first_response: Option<i64>,
) -> Vec<Value> {
    vec![
        Value::Text(starter.to_string()),
        Value::Text(closer.to_string()),
        Value::Integer(contact_count),
        Value::Integer(agent_count),
        Value::Integer(unique_messages),
        Value::Integer(follow_ups),
        Value::Real(average_response_time),
        opt_i64(time_to_first_response),
    ]
}
