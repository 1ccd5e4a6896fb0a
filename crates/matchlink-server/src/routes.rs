use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use matchlink_protocol::{
    AckResponse, AgentCommand, CompleteMatchRequest, CompleteMatchResponse, ErrorResponse,
    MatchConfig, MatchStatusResponse, ReportEventRequest, ReportEventResponse, StartMatchResponse,
    StopMatchResponse, STATUS_COMPLETED, STATUS_OK, STATUS_PENDING_AGENT, STATUS_STOPPING,
};
use matchlink_store_traits::sessions::types::Session;
use matchlink_store_traits::sessions::Pagination;
use matchlink_store_traits::{SessionId, StoreError, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::coordinator::{CoordinatorError, SessionDetail};
use crate::identity::IdentityError;
use crate::State;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHistoryResponse {
    pub sessions: Vec<Session>,
}

fn agent_user(state: &State, headers: &HeaderMap) -> Result<UserId, ApiError> {
    state.identities.agent(headers).map_err(unauthorized)
}

fn frontend_user(state: &State, headers: &HeaderMap) -> Result<UserId, ApiError> {
    state.identities.bearer(headers).map_err(unauthorized)
}

pub async fn agent_poll(
    Extension(state): Extension<State>,
    headers: HeaderMap,
) -> ApiResult<AgentCommand> {
    let user = agent_user(&state, &headers)?;
    match state.coordinator.poll(&user).await {
        Ok(command) => {
            debug!(user_id = %user, command = command.name(), "agent polled");
            Ok(Json(command))
        }
        Err(e) => Err(handle_coordinator_error("agent_poll", e)),
    }
}

pub async fn agent_heartbeat(
    Extension(state): Extension<State>,
    headers: HeaderMap,
) -> ApiResult<AckResponse> {
    let user = agent_user(&state, &headers)?;
    match state.coordinator.heartbeat(&user).await {
        Ok(_) => Ok(Json(AckResponse::ok())),
        Err(e) => Err(handle_coordinator_error("agent_heartbeat", e)),
    }
}

async fn agent_event_impl(
    state: &State,
    user: &UserId,
    payload: ReportEventRequest,
) -> Result<ReportEventResponse, ApiError> {
    if payload.event_type.trim().is_empty() {
        return Err(bad_request("event type must not be empty"));
    }
    let session_id = SessionId::new(payload.session_id);
    let event_id = state
        .coordinator
        .report_event(
            user,
            &session_id,
            payload.elapsed_ms,
            payload.event_type,
            payload.payload,
        )
        .await
        .map_err(|e| handle_coordinator_error("agent_event", e))?;

    Ok(ReportEventResponse {
        status: STATUS_OK.to_string(),
        event_id: event_id.into_inner(),
    })
}

pub async fn agent_event(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    Json(payload): Json<ReportEventRequest>,
) -> ApiResult<ReportEventResponse> {
    let user = agent_user(&state, &headers)?;
    agent_event_impl(&state, &user, payload).await.map(Json)
}

pub async fn agent_complete(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    Json(payload): Json<CompleteMatchRequest>,
) -> ApiResult<CompleteMatchResponse> {
    let user = agent_user(&state, &headers)?;
    let session_id = SessionId::new(payload.session_id);
    match state
        .coordinator
        .report_completion(
            &user,
            &session_id,
            payload.player_score,
            payload.opponent_score,
        )
        .await
    {
        Ok(session) => Ok(Json(CompleteMatchResponse {
            status: STATUS_COMPLETED.to_string(),
            score: session.score.unwrap_or_default(),
            session_id: session.id.into_inner(),
        })),
        Err(e) => Err(handle_coordinator_error("agent_complete", e)),
    }
}

pub async fn match_start(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    Json(config): Json<MatchConfig>,
) -> ApiResult<StartMatchResponse> {
    let user = frontend_user(&state, &headers)?;
    match state.coordinator.start(&user, config).await {
        Ok(session_id) => Ok(Json(StartMatchResponse {
            status: STATUS_PENDING_AGENT.to_string(),
            session_id: session_id.into_inner(),
            message: "Match queued. Waiting for your desktop agent to pick it up.".to_string(),
        })),
        Err(e) => Err(handle_coordinator_error("match_start", e)),
    }
}

pub async fn match_stop(
    Extension(state): Extension<State>,
    headers: HeaderMap,
) -> ApiResult<StopMatchResponse> {
    let user = frontend_user(&state, &headers)?;
    match state.coordinator.stop(&user).await {
        Ok(session_id) => Ok(Json(StopMatchResponse {
            status: STATUS_STOPPING.to_string(),
            session_id: session_id.into_inner(),
        })),
        Err(e) => Err(handle_coordinator_error("match_stop", e)),
    }
}

pub async fn match_status(
    Extension(state): Extension<State>,
    headers: HeaderMap,
) -> ApiResult<MatchStatusResponse> {
    let user = frontend_user(&state, &headers)?;
    match state.coordinator.status(&user).await {
        Ok(status) => Ok(Json(status)),
        Err(e) => Err(handle_coordinator_error("match_status", e)),
    }
}

pub async fn list_sessions(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<SessionHistoryResponse> {
    let user = frontend_user(&state, &headers)?;
    let pagination = Pagination::new(query.limit, query.offset);
    match state.coordinator.session_history(&user, pagination).await {
        Ok(sessions) => Ok(Json(SessionHistoryResponse { sessions })),
        Err(e) => Err(handle_coordinator_error("list_sessions", e)),
    }
}

pub async fn get_session(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<SessionDetail> {
    let user = frontend_user(&state, &headers)?;
    match state
        .coordinator
        .session_detail(&user, &SessionId::new(session_id))
        .await
    {
        Ok(detail) => Ok(Json(detail)),
        Err(e) => Err(handle_coordinator_error("get_session", e)),
    }
}

pub async fn health_check() -> Result<Json<()>, (StatusCode, String)> {
    Ok(Json(()))
}

fn unauthorized(err: IdentityError) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", err.to_string())),
    )
}

fn bad_request(detail: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid_request", detail)),
    )
}

pub(crate) fn handle_coordinator_error(function: &str, err: CoordinatorError) -> ApiError {
    let detail = err.to_string();
    match err {
        CoordinatorError::Conflict { session_id } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("conflict", detail).with_session(session_id.into_inner())),
        ),
        CoordinatorError::NotFound(_) | CoordinatorError::Store(StoreError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("not_found", detail)))
        }
        CoordinatorError::AlreadyFinalized { session_id } => (
            StatusCode::CONFLICT,
            Json(
                ErrorResponse::new("already_finalized", detail)
                    .with_session(session_id.into_inner()),
            ),
        ),
        CoordinatorError::Store(StoreError::InvalidParameters(_)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("invalid_request", detail)))
        }
        CoordinatorError::Store(e) if e.is_guard_violation() => {
            warn!("Rejected write in {function}: {e}");
            (StatusCode::CONFLICT, Json(ErrorResponse::new("conflict", detail)))
        }
        CoordinatorError::Store(e) => {
            error!("Error in {function}: {e:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal", detail)),
            )
        }
    }
}
