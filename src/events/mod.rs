use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::date_util::civil_date;
use crate::error::{Error, Result};

/// Direction of a message relative to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "INCOMING")]
    Incoming,
    #[serde(rename = "OUTGOING")]
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "INCOMING",
            Direction::Outgoing => "OUTGOING",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INCOMING" => Ok(Direction::Incoming),
            "OUTGOING" => Ok(Direction::Outgoing),
            other => Err(Error::DataQuality(format!("unknown direction: {other}"))),
        }
    }

    /// Party name used in the aggregate tables.
    pub fn party(&self) -> &'static str {
        match self {
            Direction::Incoming => "contact",
            Direction::Outgoing => "employee",
        }
    }
}

/// A single message event. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub event_id: i64,
    pub message_id: String,
    pub chat_id: String,
    pub user_id: i64,
    pub org_id: i64,
    pub agent_phone_number: String,
    pub sender_number: String,
    pub direction: Direction,
    pub message_timestamp: DateTime<Utc>,
    pub ingestion_timestamp: DateTime<Utc>,
}

/// Partition key for the lifetime pipeline, matching the
/// `conversation_summary` primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChatKey {
    pub user_id: i64,
    pub org_id: i64,
    pub chat_id: String,
    pub agent_phone_number: String,
}

/// Partition key for the daily pipeline, matching the
/// `daily_performance_summary` primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DayKey {
    pub activity_date: NaiveDate,
    pub user_id: i64,
    pub org_id: i64,
    pub chat_id: String,
    pub agent_phone_number: String,
}

fn chat_key(e: &MessageEvent) -> ChatKey {
    ChatKey {
        user_id: e.user_id,
        org_id: e.org_id,
        chat_id: e.chat_id.clone(),
        agent_phone_number: e.agent_phone_number.clone(),
    }
}

/// Group events per conversation. Input order is
/// `(chat_id, message_timestamp, event_id)` as produced by the event reader;
/// each partition keeps that order.
pub fn partition_by_chat(events: Vec<MessageEvent>) -> Vec<(ChatKey, Vec<MessageEvent>)> {
    let mut partitions: BTreeMap<ChatKey, Vec<MessageEvent>> = BTreeMap::new();
    for event in events {
        partitions.entry(chat_key(&event)).or_default().push(event);
    }
    partitions.into_iter().collect()
}

/// Group events per conversation and civil day. The activity date is the
/// message timestamp's civil date in the reference zone.
pub fn partition_by_day(events: Vec<MessageEvent>, tz: Tz) -> Vec<(DayKey, Vec<MessageEvent>)> {
    let mut partitions: BTreeMap<DayKey, Vec<MessageEvent>> = BTreeMap::new();
    for event in events {
        let key = DayKey {
            activity_date: civil_date(event.message_timestamp, tz),
            user_id: event.user_id,
            org_id: event.org_id,
            chat_id: event.chat_id.clone(),
            agent_phone_number: event.agent_phone_number.clone(),
        };
        partitions.entry(key).or_default().push(event);
    }
    partitions.into_iter().collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Build an event with just the fields the pipeline cares about.
    pub fn event(
        event_id: i64,
        chat_id: &str,
        direction: Direction,
        ts: (i32, u32, u32, u32, u32, u32),
    ) -> MessageEvent {
        let (y, mo, d, h, mi, s) = ts;
        let stamp = Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap();
        MessageEvent {
            event_id,
            message_id: format!("m{event_id}"),
            chat_id: chat_id.to_string(),
            user_id: 1,
            org_id: 1,
            agent_phone_number: "15550001111".to_string(),
            sender_number: "15550002222".to_string(),
            direction,
            message_timestamp: stamp,
            ingestion_timestamp: stamp,
        }
    }
}
