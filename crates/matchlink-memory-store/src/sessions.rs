//! Memory-based storage implementation of the SessionStorage trait

use matchlink_store_traits::sessions::types::*;
use matchlink_store_traits::sessions::{Pagination, SessionStorage, validate_update};
use matchlink_store_traits::{SessionId, StoreError, UserId};

use crate::{MatchlinkMemoryStorage, sort_newest_first};

impl MatchlinkMemoryStorage {
    fn sessions_matching<F>(&self, user_id: &UserId, filter: F) -> Vec<Session>
    where
        F: Fn(&Session) -> bool,
    {
        let inner = self.inner.read();
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|session| &session.user_id == user_id && filter(session))
            .cloned()
            .collect();
        sort_newest_first(&mut sessions);
        sessions
    }
}

impl SessionStorage for MatchlinkMemoryStorage {
    fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(format!("session {}", session.id)));
        }
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn find_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.sessions.get(session_id).cloned())
    }

    fn active_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions_matching(user_id, Session::is_active))
    }

    fn sessions_in_status(
        &self,
        user_id: &UserId,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions_matching(user_id, |session| session.status == status))
    }

    fn list_sessions(
        &self,
        user_id: &UserId,
        pagination: Pagination,
    ) -> Result<Vec<Session>, StoreError> {
        let (limit, offset) = pagination.resolve()?;
        let sessions = self.sessions_matching(user_id, |_| true);
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let stored = inner
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session.id)))?;

        validate_update(stored, session)?;
        *stored = session.clone();

        Ok(())
    }
}
