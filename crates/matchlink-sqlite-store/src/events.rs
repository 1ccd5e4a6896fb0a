//! Implementation of EventStorage trait for SQLite storage.

use matchlink_store_traits::events::EventStorage;
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::{SessionId, StoreError};
use rusqlite::{OptionalExtension, params};

use crate::db::{EVENT_COLUMNS, elapsed_to_sql, to_millis};
use crate::error::into_store_err;
use crate::validation::{
    MAX_EVENT_PAYLOAD_SIZE, MAX_EVENT_TYPE_LENGTH, MAX_EVENTS_PER_SESSION, validate_size,
    validate_string_length,
};
use crate::{MatchlinkSqliteStorage, db};

impl EventStorage for MatchlinkSqliteStorage {
    fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        validate_string_length(&event.event_type, MAX_EVENT_TYPE_LENGTH, "Event type")?;

        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize payload: {}", e)))?;
        validate_size(payload_json.as_bytes(), MAX_EVENT_PAYLOAD_SIZE, "Event payload")?;

        let elapsed_ms = elapsed_to_sql(event.elapsed_ms)?;

        self.with_connection(|conn| {
            let session_exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE id = ?",
                    params![event.session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(into_store_err)?;
            if session_exists.is_none() {
                return Err(StoreError::NotFound(format!(
                    "session {}",
                    event.session_id
                )));
            }

            let event_exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM session_events WHERE id = ?",
                    params![event.id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(into_store_err)?;
            if event_exists.is_some() {
                return Err(StoreError::AlreadyExists(format!("event {}", event.id)));
            }

            let stored: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM session_events WHERE session_id = ?",
                    params![event.session_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(into_store_err)?;
            if usize::try_from(stored).unwrap_or(usize::MAX) >= MAX_EVENTS_PER_SESSION {
                return Err(StoreError::InvalidParameters(format!(
                    "Session {} already holds the maximum of {} events",
                    event.session_id, MAX_EVENTS_PER_SESSION
                )));
            }

            conn.execute(
                "INSERT INTO session_events
                 (id, session_id, elapsed_ms, event_type, payload, received_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    event.id.as_str(),
                    event.session_id.as_str(),
                    elapsed_ms,
                    &event.event_type,
                    &payload_json,
                    to_millis(&event.received_at),
                ],
            )
            .map_err(into_store_err)?;

            Ok(())
        })
    }

    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<Event>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM session_events
                     WHERE session_id = ?
                     ORDER BY seq ASC"
                ))
                .map_err(into_store_err)?;

            let rows = stmt
                .query_map(params![session_id.as_str()], db::row_to_event)
                .map_err(into_store_err)?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(into_store_err)?);
            }
            Ok(events)
        })
    }
}
