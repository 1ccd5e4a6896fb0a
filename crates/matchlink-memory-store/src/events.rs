//! Memory-based storage implementation of the EventStorage trait

use matchlink_store_traits::events::{EventStorage, validate_event};
use matchlink_store_traits::events::types::*;
use matchlink_store_traits::{SessionId, StoreError};

use crate::MatchlinkMemoryStorage;

impl EventStorage for MatchlinkMemoryStorage {
    fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        validate_event(event)?;

        let mut inner = self.inner.write();

        if !inner.sessions.contains_key(&event.session_id) {
            return Err(StoreError::NotFound(format!(
                "session {}",
                event.session_id
            )));
        }
        if inner.event_ids.contains(&event.id) {
            return Err(StoreError::AlreadyExists(format!("event {}", event.id)));
        }

        let stored = inner
            .events
            .get(&event.session_id)
            .map(Vec::len)
            .unwrap_or(0);
        if stored >= self.limits.max_events_per_session {
            return Err(StoreError::InvalidParameters(format!(
                "Session {} already holds the maximum of {} events",
                event.session_id, self.limits.max_events_per_session
            )));
        }

        inner.event_ids.insert(event.id.clone());
        inner
            .events
            .entry(event.session_id.clone())
            .or_default()
            .push(event.clone());

        Ok(())
    }

    fn events_for_session(&self, session_id: &SessionId) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.events.get(session_id).cloned().unwrap_or_default())
    }
}
