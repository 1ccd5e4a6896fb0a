use std::time::Duration;

use async_trait::async_trait;
use matchlink_protocol::{
    AGENT_COMPLETE_PATH, AGENT_EVENT_PATH, AGENT_HEARTBEAT_PATH, AGENT_POLL_PATH,
    AGENT_TOKEN_HEADER, AckResponse, AgentCommand, CompleteMatchRequest, CompleteMatchResponse,
    ReportEventRequest, ReportEventResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Connection refused, timed out, or dropped before a response arrived.
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),
    #[error("coordinator rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid coordinator response: {0}")]
    Decode(String),
}

impl AgentError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Transient failures: transport errors, 5xx, and 429. Any other
    /// rejection is the coordinator's final answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

/// Agent-side view of the coordinator's agent surface.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn poll(&self) -> Result<AgentCommand, AgentError>;

    async fn heartbeat(&self) -> Result<(), AgentError>;

    async fn report_event(
        &self,
        event: &ReportEventRequest,
    ) -> Result<ReportEventResponse, AgentError>;

    async fn complete(
        &self,
        completion: &CompleteMatchRequest,
    ) -> Result<CompleteMatchResponse, AgentError>;
}

#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpCoordinator {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AgentError> {
        let resp = request
            .header(AGENT_TOKEN_HEADER, &self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AgentError> {
        let mut request = self.client.post(format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn poll(&self) -> Result<AgentCommand, AgentError> {
        self.send(self.client.get(format!("{}{AGENT_POLL_PATH}", self.base_url)))
            .await
    }

    async fn heartbeat(&self) -> Result<(), AgentError> {
        let _: AckResponse = self.post::<(), _>(AGENT_HEARTBEAT_PATH, None).await?;
        Ok(())
    }

    async fn report_event(
        &self,
        event: &ReportEventRequest,
    ) -> Result<ReportEventResponse, AgentError> {
        self.post(AGENT_EVENT_PATH, Some(event)).await
    }

    async fn complete(
        &self,
        completion: &CompleteMatchRequest,
    ) -> Result<CompleteMatchResponse, AgentError> {
        self.post(AGENT_COMPLETE_PATH, Some(completion)).await
    }
}

#[cfg(test)]
mod tests {
    use matchlink_protocol::Score;
    use matchlink_test_utils::{MockResponse, spawn_mock_server, spawn_one_shot_server};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn poll_sends_agent_token() {
        let (url, rx) = spawn_one_shot_server(
            "200 OK",
            r#"{"command":"start_match","session_id":"ses-1","config":{"difficulty":"diamond"}}"#,
        );
        let client = HttpCoordinator::new(format!("{url}/"), "agent-token");

        let command = client.poll().await.unwrap();
        match command {
            AgentCommand::StartMatch { session_id, config } => {
                assert_eq!(session_id, "ses-1");
                assert_eq!(config.difficulty, "diamond");
                assert_eq!(config.mode, "1v1");
            }
            other => panic!("expected start_match, got {other:?}"),
        }

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/agent/poll");
        assert_eq!(
            req.headers.get("x-agent-token").map(String::as_str),
            Some("agent-token")
        );
    }

    #[tokio::test]
    async fn report_event_posts_json_body() {
        let (url, rx) = spawn_one_shot_server("200 OK", r#"{"status":"ok","event_id":"evt-1"}"#);
        let client = HttpCoordinator::new(url, "agent-token");

        let resp = client
            .report_event(&ReportEventRequest {
                session_id: "ses-1".to_string(),
                elapsed_ms: 12_000,
                event_type: "goal_scored".to_string(),
                payload: json!({"score": "1-0"}),
            })
            .await
            .unwrap();
        assert_eq!(resp.event_id, "evt-1");

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/agent/event");
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(
            body,
            json!({
                "session_id": "ses-1",
                "elapsed_ms": 12000,
                "type": "goal_scored",
                "payload": {"score": "1-0"},
            })
        );
    }

    #[tokio::test]
    async fn heartbeat_posts_without_body() {
        let (url, rx) = spawn_one_shot_server("200 OK", r#"{"status":"ok"}"#);
        HttpCoordinator::new(url, "agent-token")
            .heartbeat()
            .await
            .unwrap();

        let req = rx.recv().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/agent/heartbeat");
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn rejection_keeps_status_and_body() {
        let (url, _rx) = spawn_one_shot_server(
            "409 Conflict",
            r#"{"error":"already_finalized","detail":"cancelled"}"#,
        );
        let err = HttpCoordinator::new(url, "agent-token")
            .complete(&CompleteMatchRequest {
                session_id: "ses-1".to_string(),
                player_score: 1,
                opponent_score: 0,
            })
            .await
            .unwrap_err();

        match err {
            AgentError::Rejected { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("already_finalized"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_response_is_a_decode_error() {
        let (url, _rx) = spawn_one_shot_server("200 OK", r#"{"command":"dance"}"#);
        let err = HttpCoordinator::new(url, "agent-token")
            .poll()
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn stop_then_complete_on_one_client() {
        let (url, rx) = spawn_mock_server(vec![
            MockResponse::ok(r#"{"command":"stop_match","session_id":"ses-9"}"#),
            MockResponse::ok(
                r#"{"status":"completed","session_id":"ses-9","score":{"player":0,"opponent":0}}"#,
            ),
        ]);
        let client = HttpCoordinator::new(url, "agent-token");

        let AgentCommand::StopMatch { session_id } = client.poll().await.unwrap() else {
            panic!("expected stop_match");
        };
        let resp = client
            .complete(&CompleteMatchRequest {
                session_id,
                player_score: 0,
                opponent_score: 0,
            })
            .await
            .unwrap();
        assert_eq!(resp.session_id, "ses-9");
        assert_eq!(resp.score, Score::new(0, 0));

        assert_eq!(rx.recv().unwrap().path, "/api/agent/poll");
        let complete = rx.recv().unwrap();
        assert_eq!(complete.header("X-Agent-Token"), Some("agent-token"));
        assert_eq!(
            complete.json(),
            json!({"session_id": "ses-9", "player_score": 0, "opponent_score": 0})
        );
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpCoordinator::new(format!("http://{addr}"), "agent-token")
            .poll()
            .await
            .unwrap_err();
        assert!(err.is_unreachable(), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn server_errors_are_retryable_but_conflicts_are_not() {
        let (url, rx) = spawn_mock_server(vec![
            MockResponse::new("503 Service Unavailable", r#"{"error":"overloaded"}"#),
            MockResponse::new("429 Too Many Requests", r#"{"error":"slow_down"}"#),
            MockResponse::new("409 Conflict", r#"{"error":"already_finalized"}"#),
            MockResponse::ok(
                r#"{"status":"completed","session_id":"ses-1","score":{"player":1,"opponent":0}}"#,
            ),
        ]);
        let client = HttpCoordinator::new(url, "agent-token");
        let completion = CompleteMatchRequest {
            session_id: "ses-1".to_string(),
            player_score: 1,
            opponent_score: 0,
        };

        let unavailable = client.complete(&completion).await.unwrap_err();
        assert!(
            matches!(unavailable, AgentError::Rejected { status: 503, .. }),
            "{unavailable:?}"
        );
        assert!(unavailable.is_retryable());

        let throttled = client.complete(&completion).await.unwrap_err();
        assert!(throttled.is_retryable(), "{throttled:?}");

        let conflict = client.complete(&completion).await.unwrap_err();
        assert!(!conflict.is_retryable(), "{conflict:?}");

        let resp = client.complete(&completion).await.unwrap();
        assert_eq!(resp.score, Score::new(1, 0));
        assert_eq!(rx.iter().take(4).count(), 4);
    }
}
