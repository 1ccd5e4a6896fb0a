//! Post-match summaries.
//!
//! The coordinator hands every finalized session to a [`SummaryGenerator`]. The
//! built-in [`RuleBasedCoach`] derives stats, insights and a drill from the
//! event log alone; model-backed generators plug in behind the same trait.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use matchlink_protocol::{
    MatchConfig, MatchOutcome, Score, EVENT_DEMO, EVENT_GOAL_CONCEDED, EVENT_GOAL_SCORED,
    EVENT_SAVE, EVENT_SHOT,
};
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::SessionId;
use serde::Serialize;
use serde_json::Value;

const MAX_INSIGHTS: usize = 5;
const MIN_INSIGHTS: usize = 3;
const DRILL_DURATION_MIN: u32 = 5;

/// Everything a generator may look at for one finalized session.
pub struct SummaryRequest<'a> {
    pub session_id: &'a SessionId,
    /// Events sorted by elapsed time
    pub events: &'a [Event],
    pub score: Score,
    pub config: &'a MatchConfig,
    pub duration: Duration,
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, request: SummaryRequest<'_>) -> anyhow::Result<Value>;
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Positive,
    Warning,
    Tip,
}

#[derive(Clone, Debug, Serialize)]
pub struct Insight {
    pub title: String,
    pub detail: String,
    #[serde(rename = "type")]
    pub kind: InsightKind,
}

impl Insight {
    fn new(kind: InsightKind, title: &str, detail: String) -> Self {
        Self {
            title: title.to_string(),
            detail,
            kind,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Drill {
    pub name: String,
    pub mode: String,
    pub difficulty: String,
    pub duration_min: u32,
    pub focus: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchStats {
    pub mode: String,
    pub difficulty: String,
    pub opponent_style: String,
    pub duration_seconds: f64,
    pub player_score: u32,
    pub opponent_score: u32,
    pub result: MatchOutcome,
    pub total_events: usize,
    pub event_counts: BTreeMap<String, usize>,
    pub goals_scored: usize,
    pub goals_conceded: usize,
    pub shots: usize,
    pub saves: usize,
    pub demos: usize,
    pub shot_conversion_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_goal_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_concede_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_per_minute: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CoachingReport {
    pub stats: MatchStats,
    pub insights: Vec<Insight>,
    pub recommended_drill: Drill,
    pub summary: String,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Drops repeated reports: same elapsed time, type and payload. Keeps the
/// first occurrence and the input order.
fn distinct_events(events: &[Event]) -> Vec<&Event> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|e| seen.insert((e.elapsed_ms, e.event_type.as_str(), e.payload.to_string())))
        .collect()
}

fn average_elapsed(events: &[&Event], event_type: &str) -> Option<u64> {
    let times: Vec<u64> = events
        .iter()
        .filter(|e| e.event_type == event_type)
        .map(|e| e.elapsed_ms)
        .collect();
    if times.is_empty() {
        return None;
    }
    let total: u128 = times.iter().map(|&t| u128::from(t)).sum();
    Some((total as f64 / times.len() as f64).round() as u64)
}

pub fn compute_stats(request: &SummaryRequest<'_>) -> MatchStats {
    let events = distinct_events(request.events);
    let mut event_counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        *event_counts.entry(event.event_type.clone()).or_default() += 1;
    }
    let count = |kind: &str| event_counts.get(kind).copied().unwrap_or(0);

    // Opponent saves/shots/demos are tagged with `team`; only the player's count
    let player_count = |kind: &str| {
        events
            .iter()
            .filter(|e| e.event_type == kind)
            .filter(|e| e.payload.get("team").and_then(Value::as_str) != Some("opponent"))
            .count()
    };

    let goals_scored = count(EVENT_GOAL_SCORED);
    let shots = player_count(EVENT_SHOT);
    let duration_seconds = round_to(request.duration.as_secs_f64(), 1);

    MatchStats {
        mode: request.config.mode.clone(),
        difficulty: request.config.difficulty.clone(),
        opponent_style: request.config.opponent_style.clone(),
        duration_seconds,
        player_score: request.score.player,
        opponent_score: request.score.opponent,
        result: request.score.outcome(),
        total_events: events.len(),
        goals_scored,
        goals_conceded: count(EVENT_GOAL_CONCEDED),
        shots,
        saves: player_count(EVENT_SAVE),
        demos: player_count(EVENT_DEMO),
        shot_conversion_rate: if shots > 0 {
            round_to(goals_scored as f64 / shots as f64, 2)
        } else {
            0.0
        },
        avg_goal_time_ms: average_elapsed(&events, EVENT_GOAL_SCORED),
        avg_concede_time_ms: average_elapsed(&events, EVENT_GOAL_CONCEDED),
        events_per_minute: (duration_seconds > 0.0)
            .then(|| round_to(events.len() as f64 / (duration_seconds / 60.0), 1)),
        event_counts,
    }
}

/// Deterministic coach that works from the event log alone.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedCoach;

impl RuleBasedCoach {
    pub fn report(&self, request: &SummaryRequest<'_>) -> CoachingReport {
        let stats = compute_stats(request);
        let difficulty = &stats.difficulty;
        let style = &stats.opponent_style;
        let (p, o) = (stats.player_score, stats.opponent_score);
        let mut insights = Vec::new();

        insights.push(match stats.result {
            MatchOutcome::Win => Insight::new(
                InsightKind::Positive,
                "Match won",
                format!(
                    "You beat the {difficulty}-tier {style} opponent {p}-{o}. The match lasted {:.0} seconds across {} events.",
                    stats.duration_seconds, stats.total_events
                ),
            ),
            MatchOutcome::Loss => Insight::new(
                InsightKind::Warning,
                "Room to improve",
                format!(
                    "You lost {p}-{o} against a {difficulty}-tier {style} opponent. Every loss is data, so look at where the goals came from."
                ),
            ),
            MatchOutcome::Draw => Insight::new(
                InsightKind::Tip,
                "Close match",
                format!(
                    "A {p}-{o} draw against a {difficulty}-tier opponent shows you're evenly matched. Small improvements will push you over the edge."
                ),
            ),
        });

        if stats.shots > 0 {
            let pct = stats.shot_conversion_rate * 100.0;
            let shots = stats.shots;
            insights.push(if stats.shot_conversion_rate >= 0.5 {
                Insight::new(
                    InsightKind::Positive,
                    "Clinical finishing",
                    format!("You converted {pct:.0}% of your {shots} shots into goals. Keep choosing your moments like that."),
                )
            } else if stats.shot_conversion_rate >= 0.2 {
                Insight::new(
                    InsightKind::Tip,
                    "Shot conversion average",
                    format!("You scored on {pct:.0}% of {shots} shots. Aim for the corners and wait for better openings."),
                )
            } else {
                Insight::new(
                    InsightKind::Warning,
                    "Low shot conversion",
                    format!("Only {pct:.0}% of your {shots} shots found the net. Place shots away from where the opponent is positioned."),
                )
            });
        }

        if stats.saves > 0 {
            if stats.saves >= stats.goals_conceded {
                insights.push(Insight::new(
                    InsightKind::Positive,
                    "Solid defense",
                    format!(
                        "You made {} saves this match. Your goalkeeping kept you in the game.",
                        stats.saves
                    ),
                ));
            }
        } else if stats.goals_conceded > 2 {
            insights.push(Insight::new(
                InsightKind::Warning,
                "Defensive gaps",
                format!(
                    "You conceded {} goals without a save. Work on positioning yourself between the ball and your goal.",
                    stats.goals_conceded
                ),
            ));
        }

        if stats.demos > 0 {
            insights.push(Insight::new(
                InsightKind::Positive,
                "Physical presence",
                format!(
                    "You landed {} demolitions. Use them to open space right before a shot.",
                    stats.demos
                ),
            ));
        }

        let fillers = [
            Insight::new(
                InsightKind::Tip,
                "Keep practicing",
                format!(
                    "You played a {} session at {} difficulty for {:.0} seconds. Play regularly to build muscle memory.",
                    stats.mode, difficulty, stats.duration_seconds
                ),
            ),
            Insight::new(
                InsightKind::Positive,
                "Session logged",
                format!(
                    "{} events were recorded for this match. Compare them with your next session to track progress.",
                    stats.total_events
                ),
            ),
            Insight::new(
                InsightKind::Tip,
                "Watch the replay",
                "Rewatch the moments before each goal and note where you were positioned.".to_string(),
            ),
        ];
        for filler in fillers {
            if insights.len() >= MIN_INSIGHTS {
                break;
            }
            insights.push(filler);
        }
        insights.truncate(MAX_INSIGHTS);

        let recommended_drill = recommend_drill(&stats);
        let verdict = match stats.result {
            MatchOutcome::Win => "Victory",
            MatchOutcome::Loss => "Defeat",
            MatchOutcome::Draw => "Draw",
        };
        let summary = format!(
            "{verdict} against a {difficulty}-tier {style} opponent ({p}-{o}). You recorded {} shots, {} saves and {} demolitions across {:.0} seconds of play. Next up: {}.",
            stats.shots,
            stats.saves,
            stats.demos,
            stats.duration_seconds,
            recommended_drill.name
        );

        CoachingReport {
            stats,
            insights,
            recommended_drill,
            summary,
        }
    }
}

fn recommend_drill(stats: &MatchStats) -> Drill {
    let key = if stats.shots > 0 && stats.shot_conversion_rate < 0.3 {
        "shooting"
    } else if stats.goals_conceded > stats.goals_scored {
        "defense"
    } else {
        stats.mode.as_str()
    };

    let (mode, name, focus) = match key {
        "shooting" => (
            "shooting",
            "Power Shot Angles",
            format!(
                "Shot accuracy: your conversion rate was {:.0}%",
                stats.shot_conversion_rate * 100.0
            ),
        ),
        "possession" => (
            "possession",
            "Pressure Keepaway",
            format!(
                "Ball control under pressure from {} opponents",
                stats.opponent_style
            ),
        ),
        "50/50s" => (
            "50/50s",
            "Challenge Timing Drill",
            "50/50 positioning and recovery after challenges".to_string(),
        ),
        _ => (
            "defense",
            "Shadow Defense Drill",
            format!(
                "Defensive positioning: you conceded {} goals this match",
                stats.goals_conceded
            ),
        ),
    };

    Drill {
        name: name.to_string(),
        mode: mode.to_string(),
        difficulty: stats.difficulty.clone(),
        duration_min: DRILL_DURATION_MIN,
        focus,
    }
}

#[async_trait]
impl SummaryGenerator for RuleBasedCoach {
    async fn generate(&self, request: SummaryRequest<'_>) -> anyhow::Result<Value> {
        let report = self.report(&request);
        tracing::debug!(
            session_id = %request.session_id,
            insights = report.insights.len(),
            drill = %report.recommended_drill.name,
            "rule-based summary generated"
        );
        Ok(serde_json::to_value(report)?)
    }
}
