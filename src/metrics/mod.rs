pub mod types;

pub use types::*;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::events::{ChatKey, DayKey};
use crate::schedule::hours::working_seconds_with_mode;
use crate::schedule::WeekSchedule;
use crate::segment::{ConversationStats, ResponsePair};

/// Mean of the non-zero values, 0.0 when none exist. A response pair whose
/// working time is zero fell entirely outside working hours and says nothing
/// about agent responsiveness, so it never drags the mean down.
pub fn mean_ignoring_zero(values: &[i64]) -> f64 {
    let nonzero: Vec<i64> = values.iter().copied().filter(|v| *v != 0).collect();
    if nonzero.is_empty() {
        return 0.0;
    }
    nonzero.iter().sum::<i64>() as f64 / nonzero.len() as f64
}

fn pair_seconds(
    pairs: &[ResponsePair],
    week: &WeekSchedule,
    tz: Tz,
    strict_same_day_containment: bool,
) -> Vec<i64> {
    pairs
        .iter()
        .map(|p| {
            working_seconds_with_mode(
                p.incoming_ts,
                p.outgoing_ts,
                week,
                tz,
                strict_same_day_containment,
            )
        })
        .collect()
}

fn first_response_seconds(
    stats: &ConversationStats,
    week: &WeekSchedule,
    tz: Tz,
    strict_same_day_containment: bool,
) -> Option<i64> {
    match (stats.first_contact_ts, stats.first_agent_ts) {
        (Some(contact), Some(agent)) if agent > contact => Some(working_seconds_with_mode(
            contact,
            agent,
            week,
            tz,
            strict_same_day_containment,
        )),
        _ => None,
    }
}

/// Fold one conversation's segmentation output into a lifetime summary row.
pub fn summarize_chat(
    key: &ChatKey,
    stats: &ConversationStats,
    conversation_start: DateTime<Utc>,
    week: &WeekSchedule,
    tz: Tz,
    strict_same_day_containment: bool,
) -> ConversationSummaryRow {
    let seconds = pair_seconds(&stats.response_pairs, week, tz, strict_same_day_containment);

    ConversationSummaryRow {
        user_id: key.user_id,
        org_id: key.org_id,
        chat_id: key.chat_id.clone(),
        phone_number: key.agent_phone_number.clone(),
        conversation_starter: stats.conversation_starter().to_string(),
        last_message_from: stats.last_message_from().to_string(),
        contact_message_count: stats.contact_message_count,
        agent_message_count: stats.agent_message_count,
        unique_messages: stats.unique_messages,
        follow_up_count: stats.follow_up_count,
        average_response_time: mean_ignoring_zero(&seconds),
        time_to_first_response: first_response_seconds(
            stats,
            week,
            tz,
            strict_same_day_containment,
        ),
        conversation_start,
    }
}

/// Fold one (conversation, day) partition's segmentation output into a daily
/// summary row.
pub fn summarize_day(
    key: &DayKey,
    stats: &ConversationStats,
    week: &WeekSchedule,
    tz: Tz,
    strict_same_day_containment: bool,
) -> DailySummaryRow {
    let seconds = pair_seconds(&stats.response_pairs, week, tz, strict_same_day_containment);

    DailySummaryRow {
        activity_date: key.activity_date,
        user_id: key.user_id,
        org_id: key.org_id,
        chat_id: key.chat_id.clone(),
        phone_number: key.agent_phone_number.clone(),
        conversation_starter: stats.conversation_starter().to_string(),
        last_message_from: stats.last_message_from().to_string(),
        contact_message_count: stats.contact_message_count,
        agent_message_count: stats.agent_message_count,
        unique_messages: stats.unique_messages,
        follow_up_count: stats.follow_up_count,
        average_response_time: mean_ignoring_zero(&seconds),
        time_to_first_response: first_response_seconds(
            stats,
            week,
            tz,
            strict_same_day_containment,
        ),
    }
}
