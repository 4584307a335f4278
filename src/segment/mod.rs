use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::events::{Direction, MessageEvent};

/// An INCOMING message and the OUTGOING reply immediately following it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePair {
    pub incoming_ts: DateTime<Utc>,
    pub outgoing_ts: DateTime<Utc>,
}

/// Aggregates derived from one ordered partition of events.
#[derive(Debug, Clone, Default)]
pub struct ConversationStats {
    pub starter_direction: Option<Direction>,
    pub last_direction: Option<Direction>,
    pub contact_message_count: i64,
    pub agent_message_count: i64,
    pub unique_messages: i64,
    pub follow_up_count: i64,
    pub first_contact_ts: Option<DateTime<Utc>>,
    pub first_agent_ts: Option<DateTime<Utc>>,
    pub response_pairs: Vec<ResponsePair>,
}

impl ConversationStats {
    /// "employee" when the agent opened the conversation, else "contact".
    pub fn conversation_starter(&self) -> &'static str {
        self.starter_direction.map(|d| d.party()).unwrap_or("contact")
    }

    pub fn last_message_from(&self) -> &'static str {
        self.last_direction.map(|d| d.party()).unwrap_or("contact")
    }
}

/// Fold an ordered event sequence into its conversation aggregates.
///
/// The input must already be sorted by `(message_timestamp, event_id)`; the
/// event reader guarantees this. A response pair is every adjacency where an
/// INCOMING event is immediately followed by an OUTGOING one; a follow-up is
/// every OUTGOING/OUTGOING adjacency.
pub fn segment(events: &[MessageEvent]) -> ConversationStats {
    let mut stats = ConversationStats::default();
    if events.is_empty() {
        return stats;
    }

    stats.starter_direction = Some(events[0].direction);
    stats.last_direction = Some(events[events.len() - 1].direction);

    let mut message_ids: HashSet<&str> = HashSet::new();
    let mut prev: Option<&MessageEvent> = None;
    for event in events {
        message_ids.insert(event.message_id.as_str());
        match event.direction {
            Direction::Incoming => {
                stats.contact_message_count += 1;
                if stats.first_contact_ts.is_none() {
                    stats.first_contact_ts = Some(event.message_timestamp);
                }
            }
            Direction::Outgoing => {
                stats.agent_message_count += 1;
                if stats.first_agent_ts.is_none() {
                    stats.first_agent_ts = Some(event.message_timestamp);
                }
            }
        }

        if let Some(p) = prev {
            match (p.direction, event.direction) {
                (Direction::Incoming, Direction::Outgoing) => {
                    stats.response_pairs.push(ResponsePair {
                        incoming_ts: p.message_timestamp,
                        outgoing_ts: event.message_timestamp,
                    });
                }
                (Direction::Outgoing, Direction::Outgoing) => {
                    stats.follow_up_count += 1;
                }
                _ => {}
            }
        }
        prev = Some(event);
    }
    stats.unique_messages = message_ids.len() as i64;

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::event;
    use crate::events::Direction::{Incoming as IN, Outgoing as OUT};

    #[test]
    fn test_empty_partition() {
        let stats = segment(&[]);
        assert_eq!(stats.starter_direction, None);
        assert_eq!(stats.response_pairs.len(), 0);
        assert_eq!(stats.unique_messages, 0);
    }

    #[test]
    fn test_counts_and_boundaries() {
        let events = vec![
            event(1, "a", IN, (2025, 1, 6, 9, 0, 0)),
            event(2, "a", OUT, (2025, 1, 6, 9, 5, 0)),
            event(3, "a", OUT, (2025, 1, 6, 9, 6, 0)),
            event(4, "a", IN, (2025, 1, 6, 9, 30, 0)),
        ];
        let stats = segment(&events);
        assert_eq!(stats.starter_direction, Some(IN));
        assert_eq!(stats.last_direction, Some(IN));
        assert_eq!(stats.contact_message_count, 2);
        assert_eq!(stats.agent_message_count, 2);
        assert_eq!(stats.unique_messages, 4);
        assert_eq!(stats.follow_up_count, 1);
        assert_eq!(stats.first_contact_ts, Some(events[0].message_timestamp));
        assert_eq!(stats.first_agent_ts, Some(events[1].message_timestamp));
        assert_eq!(stats.conversation_starter(), "contact");
        assert_eq!(stats.last_message_from(), "contact");
    }

    #[test]
    fn test_agent_started_conversation() {
        let events = vec![
            event(1, "a", OUT, (2025, 1, 6, 9, 0, 0)),
            event(2, "a", IN, (2025, 1, 6, 9, 10, 0)),
        ];
        let stats = segment(&events);
        assert_eq!(stats.conversation_starter(), "employee");
        assert_eq!(stats.last_message_from(), "contact");
        assert!(stats.response_pairs.is_empty(), "OUT then IN is not a pair");
    }

    #[test]
    fn test_response_pair_completeness() {
        // Pairs exist exactly at IN→OUT adjacencies; IN,IN and OUT,OUT and
        // OUT,IN contribute none.
        let directions = [IN, IN, OUT, OUT, IN, OUT, IN, IN, OUT];
        let events: Vec<_> = directions
            .iter()
            .enumerate()
            .map(|(i, d)| event(i as i64 + 1, "a", *d, (2025, 1, 6, 9, i as u32, 0)))
            .collect();
        let stats = segment(&events);

        let expected = directions
            .windows(2)
            .filter(|w| w[0] == IN && w[1] == OUT)
            .count();
        assert_eq!(stats.response_pairs.len(), expected);
        assert_eq!(stats.response_pairs.len(), 3);
    }

    #[test]
    fn test_pair_timestamps() {
        let events = vec![
            event(1, "a", IN, (2025, 1, 6, 9, 0, 0)),
            event(2, "a", OUT, (2025, 1, 6, 9, 5, 0)),
            event(3, "a", IN, (2025, 1, 6, 9, 30, 0)),
            event(4, "a", OUT, (2025, 1, 6, 9, 32, 0)),
        ];
        let stats = segment(&events);
        assert_eq!(stats.response_pairs.len(), 2);
        assert_eq!(stats.response_pairs[0].incoming_ts, events[0].message_timestamp);
        assert_eq!(stats.response_pairs[0].outgoing_ts, events[1].message_timestamp);
        assert_eq!(stats.response_pairs[1].incoming_ts, events[2].message_timestamp);
        assert_eq!(stats.response_pairs[1].outgoing_ts, events[3].message_timestamp);
    }

    #[test]
    fn test_duplicate_message_ids_counted_once() {
        let mut first = event(1, "a", IN, (2025, 1, 6, 9, 0, 0));
        let mut second = event(2, "a", IN, (2025, 1, 6, 9, 1, 0));
        first.message_id = "same".to_string();
        second.message_id = "same".to_string();
        let stats = segment(&[first, second]);
        assert_eq!(stats.unique_messages, 1);
        assert_eq!(stats.contact_message_count, 2);
    }
}
