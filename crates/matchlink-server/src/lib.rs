//! Coordinator service for matchlink.
//!
//! The service never connects to an agent. Agents poll for commands, stream
//! match events and report completion over HTTP, while the front-end starts,
//! stops and inspects matches through the same router.

pub mod coach;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod routes;

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use axum::http::{StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Extension, Router};
use matchlink_protocol::{
    AGENT_COMPLETE_PATH, AGENT_EVENT_PATH, AGENT_HEARTBEAT_PATH, AGENT_POLL_PATH,
    MATCH_START_PATH, MATCH_STATUS_PATH, MATCH_STOP_PATH,
};

use crate::coordinator::Coordinator;
use crate::identity::TokenDirectory;
use crate::routes::{
    agent_complete, agent_event, agent_heartbeat, agent_poll, get_session, health_check,
    list_sessions, match_start, match_status, match_stop,
};

#[derive(Clone)]
pub struct State {
    pub coordinator: Arc<Coordinator>,
    pub identities: Arc<TokenDirectory>,
}

pub fn router(state: State) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route(AGENT_POLL_PATH, get(agent_poll))
        .route(AGENT_HEARTBEAT_PATH, post(agent_heartbeat))
        .route(AGENT_EVENT_PATH, post(agent_event))
        .route(AGENT_COMPLETE_PATH, post(agent_complete))
        .route(MATCH_START_PATH, post(match_start))
        .route(MATCH_STOP_PATH, post(match_stop))
        .route(MATCH_STATUS_PATH, get(match_status))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:session_id", get(get_session))
        .fallback(fallback)
        .layer(Extension(state))
}

/// Serves the router on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: State, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    listener.set_nonblocking(true)?;
    axum::Server::from_tcp(listener)?
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn fallback(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No route for {uri}"))
}
