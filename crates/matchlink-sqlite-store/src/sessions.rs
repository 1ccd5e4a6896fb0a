//! Implementation of SessionStorage trait for SQLite storage.

use matchlink_store_traits::sessions::types::{Session, SessionStatus};
use matchlink_store_traits::sessions::{Pagination, SessionStorage, validate_update};
use matchlink_store_traits::{SessionId, StoreError, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::{SESSION_COLUMNS, to_millis};
use crate::error::into_store_err;
use crate::validation::{MAX_CONFIG_SIZE, MAX_SUMMARY_SIZE, validate_size};
use crate::{MatchlinkSqliteStorage, db};

const ACTIVE_STATUSES_SQL: &str = "('pending', 'picked_up', 'in_progress', 'stopping')";

struct EncodedSession {
    config: String,
    summary: Option<String>,
}

fn encode(session: &Session) -> Result<EncodedSession, StoreError> {
    let config = serde_json::to_string(&session.config)
        .map_err(|e| StoreError::Serialization(format!("Failed to serialize config: {}", e)))?;
    validate_size(config.as_bytes(), MAX_CONFIG_SIZE, "Match config")?;

    let summary = session
        .summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Serialization(format!("Failed to serialize summary: {}", e)))?;
    if let Some(summary) = &summary {
        validate_size(summary.as_bytes(), MAX_SUMMARY_SIZE, "Session summary")?;
    }

    Ok(EncodedSession { config, summary })
}

fn find_in(conn: &Connection, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
        params![session_id.as_str()],
        db::row_to_session,
    )
    .optional()
    .map_err(into_store_err)
}

fn query_sessions<P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Session>, StoreError>
where
    P: rusqlite::Params,
{
    let mut stmt = conn.prepare(sql).map_err(into_store_err)?;
    let rows = stmt
        .query_map(params, db::row_to_session)
        .map_err(into_store_err)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row.map_err(into_store_err)?);
    }
    Ok(sessions)
}

fn write_update(conn: &Connection, session: &Session) -> Result<(), StoreError> {
    let stored = find_in(conn, &session.id)?
        .ok_or_else(|| StoreError::NotFound(format!("session {}", session.id)))?;

    validate_update(&stored, session)?;

    let encoded = encode(session)?;
    conn.execute(
        "UPDATE sessions
         SET status = ?, ended_at = ?, player_score = ?, opponent_score = ?,
             summary = ?, last_heartbeat_at = ?
         WHERE id = ?",
        params![
            session.status.as_str(),
            session.ended_at.as_ref().map(to_millis),
            session.score.map(|s| s.player),
            session.score.map(|s| s.opponent),
            encoded.summary,
            session.last_heartbeat_at.as_ref().map(to_millis),
            session.id.as_str(),
        ],
    )
    .map_err(into_store_err)?;

    Ok(())
}

impl SessionStorage for MatchlinkSqliteStorage {
    fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let encoded = encode(session)?;

        self.with_connection(|conn| {
            if find_in(conn, &session.id)?.is_some() {
                return Err(StoreError::AlreadyExists(format!("session {}", session.id)));
            }

            conn.execute(
                "INSERT INTO sessions
                 (id, user_id, config, status, created_at, ended_at, player_score,
                  opponent_score, summary, last_heartbeat_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    session.id.as_str(),
                    session.user_id.as_str(),
                    encoded.config,
                    session.status.as_str(),
                    to_millis(&session.created_at),
                    session.ended_at.as_ref().map(to_millis),
                    session.score.map(|s| s.player),
                    session.score.map(|s| s.opponent),
                    encoded.summary,
                    session.last_heartbeat_at.as_ref().map(to_millis),
                ],
            )
            .map_err(into_store_err)?;

            Ok(())
        })
    }

    fn find_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.with_connection(|conn| find_in(conn, session_id))
    }

    fn active_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, StoreError> {
        self.with_connection(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ? AND status IN {ACTIVE_STATUSES_SQL}
                     ORDER BY created_at DESC, id DESC"
                ),
                params![user_id.as_str()],
            )
        })
    }

    fn sessions_in_status(
        &self,
        user_id: &UserId,
        status: SessionStatus,
    ) -> Result<Vec<Session>, StoreError> {
        self.with_connection(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ? AND status = ?
                     ORDER BY created_at DESC, id DESC"
                ),
                params![user_id.as_str(), status.as_str()],
            )
        })
    }

    fn list_sessions(
        &self,
        user_id: &UserId,
        pagination: Pagination,
    ) -> Result<Vec<Session>, StoreError> {
        let (limit, offset) = pagination.resolve()?;
        let limit = i64::try_from(limit).map_err(into_store_err)?;
        let offset = i64::try_from(offset).map_err(into_store_err)?;

        self.with_connection(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?
                     ORDER BY created_at DESC, id DESC
                     LIMIT ? OFFSET ?"
                ),
                params![user_id.as_str(), limit, offset],
            )
        })
    }

    fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute_batch("SAVEPOINT matchlink_update_session")
                .map_err(into_store_err)?;

            match write_update(conn, session) {
                Ok(()) => conn
                    .execute_batch("RELEASE SAVEPOINT matchlink_update_session")
                    .map_err(into_store_err),
                Err(e) => {
                    // Best-effort cleanup to keep connection usable.
                    let _ = conn.execute_batch(
                        "ROLLBACK TO SAVEPOINT matchlink_update_session; \
                         RELEASE SAVEPOINT matchlink_update_session;",
                    );
                    Err(e)
                }
            }
        })
    }
}
