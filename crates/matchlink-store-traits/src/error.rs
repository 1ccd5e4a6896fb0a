//! Error types for matchlink storage operations

use thiserror::Error;

use crate::sessions::types::SessionStatus;

/// Error type for session and event storage operations.
///
/// The guard variants (`InvalidTransition`, `ImmutableField`, `EndedAtLocked`,
/// `SummaryAlreadyAttached`, `MissingEndedAt`) are produced by
/// [`crate::sessions::validate_update`] and are returned by every backend when a
/// conditional write would break a session invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Requested item was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// An item with the same identifier already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid query parameters
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The requested status change is not an edge of the session state machine
    #[error("session {session_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Session being updated
        session_id: String,
        /// Stored status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// A field that is fixed after creation (or after finalization) was changed
    #[error("session {session_id}: field {field} is immutable")]
    ImmutableField {
        /// Session being updated
        session_id: String,
        /// Name of the offending field
        field: &'static str,
    },

    /// `ended_at` was cleared or moved after being set
    #[error("session {session_id}: ended_at is already set and cannot change")]
    EndedAtLocked {
        /// Session being updated
        session_id: String,
    },

    /// A summary is already attached to the session
    #[error("session {session_id}: summary already attached")]
    SummaryAlreadyAttached {
        /// Session being updated
        session_id: String,
    },

    /// A terminal status was written without an end timestamp
    #[error("session {session_id}: terminal status {status} requires ended_at")]
    MissingEndedAt {
        /// Session being updated
        session_id: String,
        /// Requested terminal status
        status: SessionStatus,
    },
}

impl StoreError {
    /// Whether the error comes from an invariant guard rather than the backend itself
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::ImmutableField { .. }
                | Self::EndedAtLocked { .. }
                | Self::SummaryAlreadyAttached { .. }
                | Self::MissingEndedAt { .. }
        )
    }
}
