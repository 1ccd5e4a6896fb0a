//! Sessions module
//!
//! This module is responsible for storing and retrieving coordination sessions.
//!
//! Every backend funnels status mutations through [`SessionStorage::update_session`],
//! which re-reads the stored row and checks the proposed row with
//! [`validate_update`] inside the same write lock or transaction. The
//! coordinator serializes writes per user on top of that, so the guard is the
//! last line that keeps `ended_at`, finalized scores and summaries from being
//! rewritten by a late or duplicated request.

pub mod types;

use self::types::*;
use crate::error::StoreError;
use crate::{SessionId, UserId};

/// Default page size for session history queries
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Maximum allowed page size for session history queries
pub const MAX_LIST_LIMIT: usize = 500;

/// Pagination parameters for session history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Maximum number of sessions to return
    pub limit: Option<usize>,
    /// Number of sessions to skip
    pub offset: Option<usize>,
}

impl Pagination {
    /// Create a new Pagination with specified limit and offset
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self { limit, offset }
    }

    /// Get the limit value, using default if not specified
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }

    /// Get the offset value, using 0 if not specified
    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Resolve `(limit, offset)` and reject limits outside `1..=MAX_LIST_LIMIT`
    pub fn resolve(&self) -> Result<(usize, usize), StoreError> {
        let limit = self.limit();
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(StoreError::InvalidParameters(format!(
                "Limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        Ok((limit, self.offset()))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Some(DEFAULT_LIST_LIMIT),
            offset: Some(0),
        }
    }
}

/// Storage traits for the sessions module
pub trait SessionStorage {
    /// Insert a new session
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if a session with the same id is stored.
    fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Find a session by id
    fn find_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Active sessions (`pending`, `picked_up`, `in_progress`, `stopping`) of a
    /// user, newest first
    fn active_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, StoreError>;

    /// Sessions of a user in one status, newest first
    fn sessions_in_status(
        &self,
        user_id: &UserId,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError>;

    /// Session history of a user, newest first
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidParameters`] if the limit is outside
    /// `1..=MAX_LIST_LIMIT`.
    fn list_sessions(
        &self,
        user_id: &UserId,
        pagination: Pagination,
    ) -> Result<Vec<Session>, StoreError>;

    /// Conditionally replace a stored session
    ///
    /// The stored row is loaded and checked against `session` with
    /// [`validate_update`] atomically with the write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the session is missing, or one of the
    /// guard variants if the update would break a session invariant.
    fn update_session(&self, session: &Session) -> Result<(), StoreError>;
}

/// Check that `next` is a legal successor of `stored`.
///
/// - id, owner, configuration and `created_at` never change;
/// - status only moves along [`SessionStatus::can_transition_to`] (same-status
///   rewrites are allowed);
/// - `ended_at` is never cleared or moved once set;
/// - a terminal status carries `ended_at`;
/// - the score of a finalized session is frozen;
/// - an attached summary is never replaced.
pub fn validate_update(stored: &Session, next: &Session) -> Result<(), StoreError> {
    let session_id = stored.id.to_string();

    if stored.id != next.id {
        return Err(StoreError::ImmutableField {
            session_id,
            field: "id",
        });
    }
    if stored.user_id != next.user_id {
        return Err(StoreError::ImmutableField {
            session_id,
            field: "user_id",
        });
    }
    if stored.config != next.config {
        return Err(StoreError::ImmutableField {
            session_id,
            field: "config",
        });
    }
    if stored.created_at != next.created_at {
        return Err(StoreError::ImmutableField {
            session_id,
            field: "created_at",
        });
    }

    if stored.status != next.status && !stored.status.can_transition_to(next.status) {
        return Err(StoreError::InvalidTransition {
            session_id,
            from: stored.status,
            to: next.status,
        });
    }

    if stored.ended_at.is_some() && stored.ended_at != next.ended_at {
        return Err(StoreError::EndedAtLocked { session_id });
    }

    if next.status.is_terminal() && next.ended_at.is_none() {
        return Err(StoreError::MissingEndedAt {
            session_id,
            status: next.status,
        });
    }

    if stored.status.is_terminal() && stored.score != next.score {
        return Err(StoreError::ImmutableField {
            session_id,
            field: "score",
        });
    }

    if stored.summary.is_some() && stored.summary != next.summary {
        return Err(StoreError::SummaryAlreadyAttached { session_id });
    }

    Ok(())
}
