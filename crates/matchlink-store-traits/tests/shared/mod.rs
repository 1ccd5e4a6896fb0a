//! Test functions shared by every storage backend

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use matchlink_protocol::MatchConfig;
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::sessions::types::Session;
use matchlink_store_traits::{EventId, SessionId, UserId};
use serde_json::Value;

pub mod event_tests;
pub mod session_tests;

/// Timestamp `offset_ms` after a fixed epoch, at millisecond precision
pub fn fixture_time(offset_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + offset_ms).unwrap()
}

/// A `pending` session with default configuration
pub fn create_test_session(id: &str, user: &str, offset_ms: i64) -> Session {
    Session::new_pending(
        SessionId::new(id),
        UserId::new(user),
        MatchConfig::default(),
        fixture_time(offset_ms),
    )
}

/// An event for `session_id`
pub fn create_test_event(
    id: &str,
    session_id: &str,
    elapsed_ms: u64,
    event_type: &str,
    payload: Value,
) -> Event {
    Event {
        id: EventId::new(id),
        session_id: SessionId::new(session_id),
        elapsed_ms,
        event_type: event_type.to_string(),
        payload,
        received_at: fixture_time(elapsed_ms as i64),
    }
}
