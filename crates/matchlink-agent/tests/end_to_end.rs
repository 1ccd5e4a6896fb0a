//! Runs the real coordinator on an ephemeral port against the real agent loop.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use matchlink_agent::sample::{CounterSample, MatchPhase, RuntimeSample};
use matchlink_agent::{Agent, GameRuntime, HttpCoordinator, ScriptedRuntime, Timings};
use matchlink_memory_store::MatchlinkMemoryStorage;
use matchlink_server::coach::RuleBasedCoach;
use matchlink_server::coordinator::Coordinator;
use matchlink_server::identity::TokenDirectory;
use matchlink_server::{State, serve};
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const AGENT_TOKEN: &str = "agent-alice";
const WEB_TOKEN: &str = "web-alice";

struct Harness {
    base_url: String,
    client: reqwest::Client,
    _server_shutdown: oneshot::Sender<()>,
    agent_shutdown: watch::Sender<bool>,
    agent: JoinHandle<anyhow::Result<()>>,
}

fn fast_timings() -> Timings {
    Timings {
        poll: Duration::from_millis(20),
        heartbeat: Duration::from_millis(20),
        sample: Duration::from_millis(2),
        stop_check: Duration::from_millis(20),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

impl Harness {
    fn start(runtime: Box<dyn GameRuntime>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = State {
            coordinator: Arc::new(Coordinator::new(
                Arc::new(MatchlinkMemoryStorage::default()),
                Arc::new(RuleBasedCoach),
            )),
            identities: Arc::new(
                TokenDirectory::parse(&format!("{AGENT_TOKEN}=alice,{WEB_TOKEN}=alice")).unwrap(),
            ),
        };
        let (server_tx, server_rx) = oneshot::channel();
        tokio::spawn(async move {
            serve(listener, state, async {
                let _ = server_rx.await;
            })
            .await
            .unwrap();
        });

        let api = HttpCoordinator::new(base_url.clone(), AGENT_TOKEN);
        let agent = Agent::new(Arc::new(api), runtime, fast_timings());
        let (agent_shutdown, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(async move { agent.run(shutdown_rx).await });

        Self {
            base_url,
            client: reqwest::Client::new(),
            _server_shutdown: server_tx,
            agent_shutdown,
            agent,
        }
    }

    async fn web_get(&self, path: &str) -> Value {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(WEB_TOKEN)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "GET {path}: {}", resp.status());
        resp.json().await.unwrap()
    }

    async fn web_post(&self, path: &str, body: Value) -> Value {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(WEB_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "POST {path}: {}", resp.status());
        resp.json().await.unwrap()
    }

    async fn wait_for_session(&self, session_id: &str, cond: impl Fn(&Value) -> bool) -> Value {
        let path = format!("/api/sessions/{session_id}");
        tokio::time::timeout(Duration::from_secs(15), async {
            loop {
                let detail = self.web_get(&path).await;
                if cond(&detail) {
                    return detail;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session never reached the expected state")
    }

    async fn shutdown(self) {
        self.agent_shutdown.send(true).unwrap();
        self.agent.await.unwrap().unwrap();
    }
}

fn event_types(detail: &Value) -> Vec<&str> {
    detail["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn agent_plays_a_queued_match_to_completion() {
    let harness = Harness::start(Box::new(ScriptedRuntime::demo()));

    let started = harness
        .web_post("/api/match/start", json!({"difficulty": "gold"}))
        .await;
    assert_eq!(started["status"], "pending_agent");
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let detail = harness
        .wait_for_session(&session_id, |d| !d["summary"].is_null())
        .await;

    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["score"], json!({"player": 2, "opponent": 1}));
    assert!(!detail["ended_at"].is_null());
    assert_eq!(detail["summary"]["stats"]["result"], "win");

    let types = event_types(&detail);
    assert_eq!(types.first(), Some(&"match_start"));
    assert_eq!(types.last(), Some(&"match_end"));
    assert_eq!(types.iter().filter(|t| **t == "goal_scored").count(), 2);
    let match_end = detail["events"].as_array().unwrap().last().unwrap();
    assert_eq!(match_end["payload"]["final_score"], "2-1");

    let status = harness.web_get("/api/match/status").await;
    assert_eq!(status["active"], false);

    let history = harness.web_get("/api/sessions").await;
    assert_eq!(history["sessions"].as_array().unwrap().len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn stop_from_the_website_ends_the_running_match() {
    let runtime = ScriptedRuntime::new(vec![
        RuntimeSample::new(MatchPhase::Active, CounterSample::default()),
        RuntimeSample::new(
            MatchPhase::Active,
            CounterSample {
                player_goals: 1,
                player_shots: 1,
                ..CounterSample::default()
            },
        ),
    ]);
    let harness = Harness::start(Box::new(runtime));

    let started = harness.web_post("/api/match/start", json!({})).await;
    let session_id = started["session_id"].as_str().unwrap().to_string();

    harness
        .wait_for_session(&session_id, |d| {
            d["events"]
                .as_array()
                .is_some_and(|events| events.iter().any(|e| e["type"] == "goal_scored"))
        })
        .await;
    let status = harness.web_get("/api/match/status").await;
    assert_eq!(status["active"], true);
    assert_eq!(status["agent_connected"], true);

    let stopped = harness.web_post("/api/match/stop", json!({})).await;
    assert_eq!(stopped["status"], "stopping");
    assert_eq!(stopped["session_id"], session_id.as_str());

    let detail = harness
        .wait_for_session(&session_id, |d| d["status"] == "completed")
        .await;
    assert_eq!(detail["score"], json!({"player": 1, "opponent": 0}));
    assert!(!event_types(&detail).contains(&"match_end"));

    harness.shutdown().await;
}
