//! Types for the sessions module

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use matchlink_protocol::{MatchConfig, Score};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::StoreError;
use crate::{SessionId, UserId};

/// Lifecycle state of a coordination session
///
/// ```text
/// pending -> picked_up -> in_progress
///    \          \             \
///     +----------+-------------+--> stopping
///     \          \             \        \
///      +----------+-------------+--------+--> completed | cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStatus {
    /// Created by the front-end, not yet handed to an agent
    Pending,
    /// The start command was delivered by a poll
    PickedUp,
    /// The agent reported liveness after picking the session up
    InProgress,
    /// A stop was requested; waiting for the agent's completion report
    Stopping,
    /// Finalized with a score reported by the agent
    Completed,
    /// Force-closed by the coordinator
    Cancelled,
}

impl SessionStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [SessionStatus; 6] = [
        Self::Pending,
        Self::PickedUp,
        Self::InProgress,
        Self::Stopping,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Statuses that count towards the one-active-session-per-user rule
    pub const ACTIVE: [SessionStatus; 4] = [
        Self::Pending,
        Self::PickedUp,
        Self::InProgress,
        Self::Stopping,
    ];

    /// Get as `&str`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PickedUp => "picked_up",
            Self::InProgress => "in_progress",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the session still occupies the user's single active slot
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether an agent has taken the session
    pub fn is_agent_attached(&self) -> bool {
        matches!(self, Self::PickedUp | Self::InProgress | Self::Stopping)
    }

    /// Whether `next` is a forward edge of the state machine.
    ///
    /// Rewriting the same status is not an edge; callers that allow
    /// liveness refreshes check equality first.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        match self {
            Pending => matches!(next, PickedUp | Stopping | Completed | Cancelled),
            PickedUp => matches!(next, InProgress | Stopping | Completed | Cancelled),
            InProgress => matches!(next, Stopping | Completed | Cancelled),
            Stopping => matches!(next, Completed | Cancelled),
            Completed | Cancelled => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "picked_up" => Ok(Self::PickedUp),
            "in_progress" => Ok(Self::InProgress),
            "stopping" => Ok(Self::Stopping),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(StoreError::InvalidParameters(format!(
                "Invalid session status: {}",
                s
            ))),
        }
    }
}

impl Serialize for SessionStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One coordination record for a single match attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier, fixed at insert
    pub id: SessionId,
    /// Owning user, fixed at insert
    pub user_id: UserId,
    /// Match configuration handed to the agent verbatim, fixed at insert
    pub config: MatchConfig,
    /// Current lifecycle state
    pub status: SessionStatus,
    /// Creation time, fixed at insert
    pub created_at: DateTime<Utc>,
    /// Set once when the session stops or finalizes, never cleared or moved
    pub ended_at: Option<DateTime<Utc>>,
    /// Final (or forced) score
    pub score: Option<Score>,
    /// Post-match summary, attached at most once
    pub summary: Option<Value>,
    /// Last agent heartbeat. Advisory only.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a fresh `pending` session
    pub fn new_pending(
        id: SessionId,
        user_id: UserId,
        config: MatchConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            config,
            status: SessionStatus::Pending,
            created_at,
            ended_at: None,
            score: None,
            summary: None,
            last_heartbeat_at: None,
        }
    }

    /// Whether the session still occupies the user's single active slot
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Wall-clock duration between creation and end, if ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.created_at)
    }
}
