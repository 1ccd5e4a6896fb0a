use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use matchlink_protocol::{AgentCommand, MatchConfig, MatchStatusResponse, Score};
use matchlink_store_traits::events::sort_chronologically;
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::sessions::types::{Session, SessionStatus};
use matchlink_store_traits::sessions::Pagination;
use matchlink_store_traits::{EventId, MatchStorage, SessionId, StoreError, UserId};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::coach::{SummaryGenerator, SummaryRequest};

/// An active session older than this is presumed abandoned.
pub const STALE_SESSION_AGE: Duration = Duration::from_secs(5 * 60);
/// How long a stop request keeps being handed to polling agents.
pub const STOP_COMMAND_FRESHNESS: Duration = Duration::from_secs(60);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const ORPHAN_HEARTBEAT_MULTIPLE: u32 = 4;
pub const ORPHAN_HEARTBEAT_WINDOW: Duration =
    Duration::from_secs(HEARTBEAT_INTERVAL.as_secs() * ORPHAN_HEARTBEAT_MULTIPLE as u64);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock truncated to the millisecond precision every backend persists.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("session {session_id} is already active")]
    Conflict { session_id: SessionId },
    #[error("{0} not found")]
    NotFound(String),
    #[error("session {session_id} was cancelled before completion was reported")]
    AlreadyFinalized { session_id: SessionId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub events: Vec<Event>,
}

pub struct Coordinator {
    storage: Arc<dyn MatchStorage>,
    summaries: Arc<dyn SummaryGenerator>,
    clock: Arc<dyn Clock>,
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

fn stop_is_fresh(session: &Session, now: DateTime<Utc>) -> bool {
    session
        .ended_at
        .is_some_and(|stopped| elapsed_since(now, stopped) <= STOP_COMMAND_FRESHNESS)
}

/// Whether an active session may be force-cancelled to make room for a new one.
pub fn is_stale(session: &Session, now: DateTime<Utc>) -> bool {
    if elapsed_since(now, session.created_at) > STALE_SESSION_AGE {
        return true;
    }
    if session
        .last_heartbeat_at
        .is_some_and(|beat| elapsed_since(now, beat) > ORPHAN_HEARTBEAT_WINDOW)
    {
        return true;
    }
    session.status == SessionStatus::Stopping && !stop_is_fresh(session, now)
}

fn new_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}-{:08x}{:08x}",
        prefix,
        rng.r#gen::<u32>(),
        rng.r#gen::<u32>()
    )
}

impl Coordinator {
    pub fn new(storage: Arc<dyn MatchStorage>, summaries: Arc<dyn SummaryGenerator>) -> Self {
        Self::with_clock(storage, summaries, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn MatchStorage>,
        summaries: Arc<dyn SummaryGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            summaries,
            clock,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn MatchStorage> {
        &self.storage
    }

    async fn lock_user(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock().await;
            locks.entry(user.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn owned_session(&self, user: &UserId, session_id: &SessionId) -> Result<Session, CoordinatorError> {
        match self.storage.find_session(session_id)? {
            Some(session) if &session.user_id == user => Ok(session),
            _ => Err(CoordinatorError::NotFound(format!("session {session_id}"))),
        }
    }

    fn force_cancel(&self, mut session: Session, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
        let previous = session.status;
        session.status = SessionStatus::Cancelled;
        session.ended_at.get_or_insert(now);
        session.score.get_or_insert(Score::default());
        self.storage.update_session(&session)?;
        warn!(
            user_id = %session.user_id,
            session_id = %session.id,
            from = %previous,
            "force-cancelled stale session"
        );
        Ok(())
    }

    /// Queues a new match for the user's agent.
    pub async fn start(&self, user: &UserId, config: MatchConfig) -> Result<SessionId, CoordinatorError> {
        let _guard = self.lock_user(user).await;
        let now = self.clock.now();

        let active = self.storage.active_sessions(user)?;
        if let Some(live) = active.iter().find(|s| !is_stale(s, now)) {
            return Err(CoordinatorError::Conflict {
                session_id: live.id.clone(),
            });
        }
        for stale in active {
            self.force_cancel(stale, now)?;
        }

        let session = Session::new_pending(
            SessionId::new(new_id("ses")),
            user.clone(),
            config,
            now,
        );
        self.storage.insert_session(&session)?;
        info!(
            user_id = %user,
            session_id = %session.id,
            difficulty = %session.config.difficulty,
            mode = %session.config.mode,
            "match queued for agent"
        );
        Ok(session.id)
    }

    /// Next command for the user's agent.
    pub async fn poll(&self, user: &UserId) -> Result<AgentCommand, CoordinatorError> {
        let _guard = self.lock_user(user).await;
        let now = self.clock.now();

        let pending = self.storage.sessions_in_status(user, SessionStatus::Pending)?;
        if let Some(mut session) = pending.into_iter().next() {
            session.status = SessionStatus::PickedUp;
            self.storage.update_session(&session)?;
            info!(user_id = %user, session_id = %session.id, "start command delivered");
            return Ok(AgentCommand::StartMatch {
                session_id: session.id.into_inner(),
                config: session.config,
            });
        }

        let stopping = self.storage.sessions_in_status(user, SessionStatus::Stopping)?;
        if let Some(session) = stopping.into_iter().find(|s| stop_is_fresh(s, now)) {
            debug!(user_id = %user, session_id = %session.id, "stop command delivered");
            return Ok(AgentCommand::StopMatch {
                session_id: session.id.into_inner(),
            });
        }

        Ok(AgentCommand::Idle)
    }

    /// Refreshes the liveness marker of the user's newest active session.
    pub async fn heartbeat(&self, user: &UserId) -> Result<Option<SessionId>, CoordinatorError> {
        let _guard = self.lock_user(user).await;
        let now = self.clock.now();

        let Some(mut session) = self.storage.active_sessions(user)?.into_iter().next() else {
            return Ok(None);
        };
        session.last_heartbeat_at = Some(now);
        if session.status == SessionStatus::PickedUp {
            session.status = SessionStatus::InProgress;
            info!(user_id = %user, session_id = %session.id, "match in progress");
        }
        self.storage.update_session(&session)?;
        Ok(Some(session.id))
    }

    pub async fn report_event(
        &self,
        user: &UserId,
        session_id: &SessionId,
        elapsed_ms: u64,
        event_type: String,
        payload: Value,
    ) -> Result<EventId, CoordinatorError> {
        self.owned_session(user, session_id)?;

        let event = Event {
            id: EventId::new(new_id("evt")),
            session_id: session_id.clone(),
            elapsed_ms,
            event_type,
            payload,
            received_at: self.clock.now(),
        };
        self.storage.append_event(&event)?;
        debug!(
            session_id = %session_id,
            event_id = %event.id,
            event_type = %event.event_type,
            elapsed_ms,
            "event recorded"
        );
        Ok(event.id)
    }

    /// Requests early cancellation of the user's active session.
    pub async fn stop(&self, user: &UserId) -> Result<SessionId, CoordinatorError> {
        let _guard = self.lock_user(user).await;
        let now = self.clock.now();

        let mut active = self.storage.active_sessions(user)?.into_iter();
        let Some(mut target) = active.next() else {
            return Err(CoordinatorError::NotFound(format!(
                "active session for user {user}"
            )));
        };
        for other in active {
            if other.status == SessionStatus::Stopping && !stop_is_fresh(&other, now) {
                self.force_cancel(other, now)?;
            }
        }

        if target.status == SessionStatus::Stopping {
            debug!(user_id = %user, session_id = %target.id, "stop already requested");
            return Ok(target.id);
        }

        target.status = SessionStatus::Stopping;
        target.ended_at.get_or_insert(now);
        self.storage.update_session(&target)?;
        info!(user_id = %user, session_id = %target.id, "stop requested");
        Ok(target.id)
    }

    /// Finalizes a session with the agent's score and attaches its summary.
    pub async fn report_completion(
        &self,
        user: &UserId,
        session_id: &SessionId,
        player_score: u32,
        opponent_score: u32,
    ) -> Result<Session, CoordinatorError> {
        let finalized = {
            let _guard = self.lock_user(user).await;
            let now = self.clock.now();
            let mut session = self.owned_session(user, session_id)?;

            match session.status {
                SessionStatus::Completed => {
                    info!(session_id = %session_id, "duplicate completion report ignored");
                    return Ok(session);
                }
                SessionStatus::Cancelled => {
                    return Err(CoordinatorError::AlreadyFinalized {
                        session_id: session.id,
                    });
                }
                _ => {}
            }

            session.score = Some(Score::new(player_score, opponent_score));
            session.ended_at.get_or_insert(now);
            session.status = SessionStatus::Completed;
            self.storage.update_session(&session)?;
            info!(
                user_id = %user,
                session_id = %session_id,
                score = %Score::new(player_score, opponent_score),
                "match completed"
            );
            session
        };

        Ok(self.attach_summary(user, finalized).await)
    }

    async fn attach_summary(&self, user: &UserId, session: Session) -> Session {
        let summary = match self.generate_summary(&session).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "summary generation failed");
                json!({"status": "degraded", "error": format!("{err:#}")})
            }
        };

        let _guard = self.lock_user(user).await;
        let mut current = match self.storage.find_session(&session.id) {
            Ok(Some(current)) => current,
            Ok(None) => return session,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "failed to reload session for summary");
                return session;
            }
        };
        if current.summary.is_some() {
            return current;
        }
        current.summary = Some(summary);
        match self.storage.update_session(&current) {
            Ok(()) => current,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "failed to persist summary");
                session
            }
        }
    }

    async fn generate_summary(&self, session: &Session) -> anyhow::Result<Value> {
        let mut events = self.storage.events_for_session(&session.id)?;
        sort_chronologically(&mut events);

        let duration = session
            .duration()
            .and_then(|d| d.to_std().ok())
            .unwrap_or(Duration::ZERO);

        self.summaries
            .generate(SummaryRequest {
                session_id: &session.id,
                events: &events,
                score: session.score.unwrap_or_default(),
                config: &session.config,
                duration,
            })
            .await
    }

    pub async fn status(&self, user: &UserId) -> Result<MatchStatusResponse, CoordinatorError> {
        let Some(session) = self.storage.active_sessions(user)?.into_iter().next() else {
            return Ok(MatchStatusResponse::default());
        };
        Ok(MatchStatusResponse {
            active: true,
            started_at: Some(session.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            agent_connected: session.status.is_agent_attached(),
            session_id: Some(session.id.into_inner()),
            config: Some(session.config),
        })
    }

    pub async fn session_history(
        &self,
        user: &UserId,
        pagination: Pagination,
    ) -> Result<Vec<Session>, CoordinatorError> {
        Ok(self.storage.list_sessions(user, pagination)?)
    }

    pub async fn session_detail(
        &self,
        user: &UserId,
        session_id: &SessionId,
    ) -> Result<SessionDetail, CoordinatorError> {
        let session = self.owned_session(user, session_id)?;
        let mut events = self.storage.events_for_session(session_id)?;
        sort_chronologically(&mut events);
        Ok(SessionDetail { session, events })
    }
}
