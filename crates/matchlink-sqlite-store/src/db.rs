//! Database utilities for SQLite storage.

use std::io::{Error as IoError, ErrorKind};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use matchlink_protocol::{MatchConfig, Score};
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::sessions::types::{Session, SessionStatus};
use matchlink_store_traits::{EventId, SessionId, StoreError, UserId};
use rusqlite::types::Type;
use rusqlite::{Error, Result as SqliteResult, Row};

/// Columns selected for every session query, in `row_to_session` order
pub const SESSION_COLUMNS: &str = "id, user_id, config, status, created_at, ended_at, \
     player_score, opponent_score, summary, last_heartbeat_at";

/// Columns selected for every event query
pub const EVENT_COLUMNS: &str = "id, session_id, elapsed_ms, event_type, payload, received_at";

#[inline]
fn map_to_text_boxed_error<T>(e: T) -> Error
where
    T: std::error::Error + Send + Sync + 'static,
{
    Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
}

#[inline]
fn map_invalid_integer_data(msg: &str) -> Error {
    Error::FromSqlConversionFailure(
        0,
        Type::Integer,
        Box::new(IoError::new(ErrorKind::InvalidData, msg)),
    )
}

/// Timestamp to unix milliseconds
#[inline]
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> SqliteResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| map_invalid_integer_data("Timestamp out of range"))
}

fn optional_from_millis(ms: Option<i64>) -> SqliteResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

/// Elapsed time as a SQLite integer
pub fn elapsed_to_sql(elapsed_ms: u64) -> Result<i64, StoreError> {
    i64::try_from(elapsed_ms).map_err(|_| {
        StoreError::InvalidParameters(format!("elapsed_ms out of range: {}", elapsed_ms))
    })
}

/// Convert a row to a Session struct
pub fn row_to_session(row: &Row) -> SqliteResult<Session> {
    let id: String = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let config_json: &str = row.get_ref("config")?.as_str()?;
    let status_str: &str = row.get_ref("status")?.as_str()?;
    let created_at: i64 = row.get("created_at")?;
    let ended_at: Option<i64> = row.get("ended_at")?;
    let player_score: Option<u32> = row.get("player_score")?;
    let opponent_score: Option<u32> = row.get("opponent_score")?;
    let summary_json: Option<String> = row.get("summary")?;
    let last_heartbeat_at: Option<i64> = row.get("last_heartbeat_at")?;

    let config: MatchConfig = serde_json::from_str(config_json).map_err(map_to_text_boxed_error)?;
    let status: SessionStatus =
        SessionStatus::from_str(status_str).map_err(map_to_text_boxed_error)?;
    let score = match (player_score, opponent_score) {
        (Some(player), Some(opponent)) => Some(Score::new(player, opponent)),
        _ => None,
    };
    let summary = summary_json
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(map_to_text_boxed_error)?;

    Ok(Session {
        id: SessionId::new(id),
        user_id: UserId::new(user_id),
        config,
        status,
        created_at: from_millis(created_at)?,
        ended_at: optional_from_millis(ended_at)?,
        score,
        summary,
        last_heartbeat_at: optional_from_millis(last_heartbeat_at)?,
    })
}

/// Convert a row to an Event struct
pub fn row_to_event(row: &Row) -> SqliteResult<Event> {
    let id: String = row.get("id")?;
    let session_id: String = row.get("session_id")?;
    let elapsed_ms: i64 = row.get("elapsed_ms")?;
    let event_type: String = row.get("event_type")?;
    let payload_json: &str = row.get_ref("payload")?.as_str()?;
    let received_at: i64 = row.get("received_at")?;

    let elapsed_ms =
        u64::try_from(elapsed_ms).map_err(|_| map_invalid_integer_data("Negative elapsed_ms"))?;
    let payload = serde_json::from_str(payload_json).map_err(map_to_text_boxed_error)?;

    Ok(Event {
        id: EventId::new(id),
        session_id: SessionId::new(session_id),
        elapsed_ms,
        event_type,
        payload,
        received_at: from_millis(received_at)?,
    })
}
