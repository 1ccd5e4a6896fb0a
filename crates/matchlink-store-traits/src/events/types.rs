//! Types for the events module

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventId, SessionId};

/// A timestamped domain event reported by the agent while a match runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier, assigned by the coordinator
    pub id: EventId,
    /// Session the event belongs to
    pub session_id: SessionId,
    /// Agent-local elapsed time since match start, in milliseconds
    pub elapsed_ms: u64,
    /// Event type tag (`goal_scored`, `save`, ...)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque event payload
    pub payload: Value,
    /// Time the coordinator accepted the event
    pub received_at: DateTime<Utc>,
}
