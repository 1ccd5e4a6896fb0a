//! Events module
//!
//! Append-only event log per session. Events are kept in submission order;
//! readers that need chronology use [`sort_chronologically`].

pub mod types;

use self::types::*;
use crate::SessionId;
use crate::error::StoreError;

/// Maximum number of events kept per session
pub const MAX_EVENTS_PER_SESSION: usize = 10_000;

/// Maximum length for an event type tag (64 bytes, UTF-8 encoded)
pub const MAX_EVENT_TYPE_LENGTH: usize = 64;

/// Maximum size for a serialized event payload (64 KB)
pub const MAX_EVENT_PAYLOAD_SIZE: usize = 64 * 1024;

/// Storage traits for the events module
pub trait EventStorage {
    /// Append an event to its session's log
    ///
    /// Duplicates and out-of-order elapsed times are accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the session does not exist,
    /// [`StoreError::AlreadyExists`] on an event id collision, and
    /// [`StoreError::InvalidParameters`] when the event breaks
    /// [`validate_event`] or the session already holds
    /// [`MAX_EVENTS_PER_SESSION`] events.
    fn append_event(&self, event: &Event) -> Result<(), StoreError>;

    /// All events of a session, in submission order
    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<Event>, StoreError>;
}

/// Check an event's type tag and serialized payload against the size limits
/// every backend enforces.
pub fn validate_event(event: &Event) -> Result<(), StoreError> {
    if event.event_type.len() > MAX_EVENT_TYPE_LENGTH {
        return Err(StoreError::InvalidParameters(format!(
            "Event type exceeds maximum length of {MAX_EVENT_TYPE_LENGTH} bytes (got {})",
            event.event_type.len()
        )));
    }
    let payload = serde_json::to_vec(&event.payload)
        .map_err(|e| StoreError::Serialization(format!("Failed to serialize payload: {e}")))?;
    if payload.len() > MAX_EVENT_PAYLOAD_SIZE {
        return Err(StoreError::InvalidParameters(format!(
            "Event payload exceeds maximum size of {MAX_EVENT_PAYLOAD_SIZE} bytes (got {})",
            payload.len()
        )));
    }
    Ok(())
}

/// Stable sort by elapsed time; events with equal tags keep submission order
pub fn sort_chronologically(events: &mut [Event]) {
    events.sort_by_key(|event| event.elapsed_ms);
}
