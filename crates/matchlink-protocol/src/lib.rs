use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const AGENT_TOKEN_HEADER: &str = "X-Agent-Token";

pub const AGENT_POLL_PATH: &str = "/api/agent/poll";
pub const AGENT_HEARTBEAT_PATH: &str = "/api/agent/heartbeat";
pub const AGENT_EVENT_PATH: &str = "/api/agent/event";
pub const AGENT_COMPLETE_PATH: &str = "/api/agent/complete";

pub const MATCH_START_PATH: &str = "/api/match/start";
pub const MATCH_STOP_PATH: &str = "/api/match/stop";
pub const MATCH_STATUS_PATH: &str = "/api/match/status";

pub const STATUS_OK: &str = "ok";
pub const STATUS_PENDING_AGENT: &str = "pending_agent";
pub const STATUS_STOPPING: &str = "stopping";
pub const STATUS_COMPLETED: &str = "completed";

pub const EVENT_MATCH_START: &str = "match_start";
pub const EVENT_GOAL_SCORED: &str = "goal_scored";
pub const EVENT_GOAL_CONCEDED: &str = "goal_conceded";
pub const EVENT_SAVE: &str = "save";
pub const EVENT_SHOT: &str = "shot";
pub const EVENT_DEMO: &str = "demo";
pub const EVENT_MATCH_END: &str = "match_end";

pub const DEFAULT_MODE: &str = "1v1";
pub const DEFAULT_DIFFICULTY: &str = "gold";
pub const DEFAULT_OPPONENT_STYLE: &str = "passive";

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn default_difficulty() -> String {
    DEFAULT_DIFFICULTY.to_string()
}

fn default_opponent_style() -> String {
    DEFAULT_OPPONENT_STYLE.to_string()
}

/// Match configuration chosen on the website and handed to the agent verbatim.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_opponent_style")]
    pub opponent_style: String,
    #[serde(
        default,
        alias = "checkpoint_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub checkpoint_ref: Option<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            difficulty: default_difficulty(),
            opponent_style: default_opponent_style(),
            checkpoint_ref: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Draw => "draw",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Score {
    pub player: u32,
    pub opponent: u32,
}

impl Score {
    pub fn new(player: u32, opponent: u32) -> Self {
        Self { player, opponent }
    }

    pub fn outcome(&self) -> MatchOutcome {
        match self.player.cmp(&self.opponent) {
            std::cmp::Ordering::Greater => MatchOutcome::Win,
            std::cmp::Ordering::Less => MatchOutcome::Loss,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.player, self.opponent)
    }
}

/// Answer to `GET /api/agent/poll`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    Idle,
    StartMatch {
        session_id: String,
        config: MatchConfig,
    },
    StopMatch {
        session_id: String,
    },
}

impl AgentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StartMatch { .. } => "start_match",
            Self::StopMatch { .. } => "stop_match",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ReportEventRequest {
    pub session_id: String,
    #[serde(alias = "t_ms")]
    pub elapsed_ms: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, alias = "payload_json")]
    pub payload: Value,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReportEventResponse {
    pub status: String,
    pub event_id: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompleteMatchRequest {
    pub session_id: String,
    pub player_score: u32,
    pub opponent_score: u32,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompleteMatchResponse {
    pub status: String,
    pub session_id: String,
    pub score: Score,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StartMatchResponse {
    pub status: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StopMatchResponse {
    pub status: String,
    pub session_id: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchStatusResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default)]
    pub config: Option<MatchConfig>,
    #[serde(default)]
    pub agent_connected: bool,
}

/// Body of every non-2xx response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
