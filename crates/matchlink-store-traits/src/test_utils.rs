//! Fixture builders shared by backend and coordinator tests

use chrono::{DateTime, TimeZone, Utc};
use matchlink_protocol::MatchConfig;
use serde_json::Value;

use crate::events::types::Event;
use crate::sessions::types::Session;
use crate::{EventId, SessionId, UserId};

/// Fixed epoch used by fixtures, in unix milliseconds
pub const FIXTURE_EPOCH_MS: i64 = 1_700_000_000_000;

/// Timestamp `offset_ms` after [`FIXTURE_EPOCH_MS`]
pub fn fixture_time(offset_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(FIXTURE_EPOCH_MS + offset_ms)
        .single()
        .expect("fixture timestamp in range")
}

/// A `pending` session with default configuration, created `offset_ms` after the fixture epoch
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
