use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Lifetime analytics for one conversation; one row of
/// `conversation_summary`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummaryRow {
    pub user_id: i64,
    pub org_id: i64,
    pub chat_id: String,
    pub phone_number: String,
    pub conversation_starter: String,
    pub last_message_from: String,
    pub contact_message_count: i64,
    pub agent_message_count: i64,
    pub unique_messages: i64,
    pub follow_up_count: i64,
    /// Mean working-hours response time in seconds, zeros excluded.
    pub average_response_time: f64,
    /// Working seconds from first contact message to first agent message;
    /// absent when the agent never replied after the first contact.
    pub time_to_first_response: Option<i64>,
    /// Timestamp of the first event; becomes `created_at` on insert.
    pub conversation_start: DateTime<Utc>,
}

/// One conversation's analytics for one civil day; one row of
/// `daily_performance_summary`.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummaryRow {
    pub activity_date: NaiveDate,
    pub user_id: i64,
    pub org_id: i64,
    pub chat_id: String,
    pub phone_number: String,
    pub conversation_starter: String,
    pub last_message_from: String,
    pub contact_message_count: i64,
    pub agent_message_count: i64,
    pub unique_messages: i64,
    pub follow_up_count: i64,
    pub average_response_time: f64,
    pub time_to_first_response: Option<i64>,
}
