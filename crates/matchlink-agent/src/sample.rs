//! Turning periodic runtime samples into match events.
//!
//! The runtime only exposes cumulative per-side counters. Events are derived
//! by diffing consecutive samples, so a lost sample never loses an event: the
//! next diff covers it.

use matchlink_protocol::{
    EVENT_DEMO, EVENT_GOAL_CONCEDED, EVENT_GOAL_SCORED, EVENT_MATCH_END, EVENT_SAVE, EVENT_SHOT,
    Score,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

const PLAYER: &str = "player";
const OPPONENT: &str = "opponent";

/// Largest per-counter increase accepted between two samples. Anything above
/// is a runtime glitch rather than play.
pub const MAX_EVENTS_PER_TICK: u32 = 32;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CounterSample {
    pub player_goals: u32,
    pub opponent_goals: u32,
    pub player_saves: u32,
    pub opponent_saves: u32,
    pub player_shots: u32,
    pub opponent_shots: u32,
    pub player_demos: u32,
    pub opponent_demos: u32,
}

impl CounterSample {
    pub fn score(&self) -> Score {
        Score::new(self.player_goals, self.opponent_goals)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    #[default]
    Inactive,
    Countdown,
    Active,
    Paused,
    Ended,
    #[serde(other)]
    Other,
}

/// One state sample read from the game runtime.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuntimeSample {
    #[serde(default)]
    pub phase: MatchPhase,
    #[serde(flatten)]
    pub counters: CounterSample,
}

impl RuntimeSample {
    pub fn new(phase: MatchPhase, counters: CounterSample) -> Self {
        Self { phase, counters }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedEvent {
    pub event_type: &'static str,
    pub payload: Value,
}

impl DerivedEvent {
    fn side(event_type: &'static str, team: &str) -> Self {
        Self {
            event_type,
            payload: json!({ "team": team }),
        }
    }
}

/// Events implied by the counter changes between two samples.
///
/// A counter that went down, or jumped by more than [`MAX_EVENTS_PER_TICK`],
/// is treated as a new baseline and yields nothing.
pub fn derive_events(prev: &CounterSample, current: &CounterSample) -> Vec<DerivedEvent> {
    let mut events = Vec::new();

    for k in 1..=increase("player_goals", prev.player_goals, current.player_goals) {
        events.push(DerivedEvent {
            event_type: EVENT_GOAL_SCORED,
            payload: json!({
                "score": Score::new(prev.player_goals + k, prev.opponent_goals).to_string()
            }),
        });
    }
    for k in 1..=increase("opponent_goals", prev.opponent_goals, current.opponent_goals) {
        events.push(DerivedEvent {
            event_type: EVENT_GOAL_CONCEDED,
            payload: json!({
                "score": Score::new(current.player_goals, prev.opponent_goals + k).to_string()
            }),
        });
    }

    let per_side = [
        ("player_saves", EVENT_SAVE, PLAYER, prev.player_saves, current.player_saves),
        ("opponent_saves", EVENT_SAVE, OPPONENT, prev.opponent_saves, current.opponent_saves),
        ("player_shots", EVENT_SHOT, PLAYER, prev.player_shots, current.player_shots),
        ("opponent_shots", EVENT_SHOT, OPPONENT, prev.opponent_shots, current.opponent_shots),
        ("player_demos", EVENT_DEMO, PLAYER, prev.player_demos, current.player_demos),
        ("opponent_demos", EVENT_DEMO, OPPONENT, prev.opponent_demos, current.opponent_demos),
    ];
    for (counter, event_type, team, before, after) in per_side {
        for _ in 0..increase(counter, before, after) {
            events.push(DerivedEvent::side(event_type, team));
        }
    }

    events
}

fn increase(counter: &'static str, before: u32, after: u32) -> u32 {
    let delta = after.saturating_sub(before);
    if delta > MAX_EVENTS_PER_TICK {
        warn!(counter, before, after, "counter jump too large, taking as new baseline");
        return 0;
    }
    delta
}

#[derive(Debug, Default, PartialEq)]
pub struct Observation {
    pub events: Vec<DerivedEvent>,
    /// Set once, on the sample that ends the match.
    pub finished: Option<Score>,
}

/// Stateful wrapper over [`derive_events`] for one match.
#[derive(Debug, Default)]
pub struct MatchTracker {
    baseline: CounterSample,
    seen_active: bool,
    last_phase: Option<MatchPhase>,
    finished: bool,
}

impl MatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score from the most recent sample. Counters seen before kickoff belong
    /// to an earlier match and read as 0-0.
    pub fn score(&self) -> Score {
        if self.seen_active {
            self.baseline.score()
        } else {
            Score::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn observe(&mut self, sample: &RuntimeSample) -> Observation {
        let mut observation = Observation::default();

        if sample.phase == MatchPhase::Active {
            self.seen_active = true;
        }
        if self.seen_active && !self.finished {
            observation.events = derive_events(&self.baseline, &sample.counters);
        }
        self.baseline = sample.counters;

        let ended_now = sample.phase == MatchPhase::Ended
            && self.last_phase != Some(MatchPhase::Ended)
            && self.seen_active
            && !self.finished;
        if ended_now {
            self.finished = true;
            let counters = sample.counters;
            let score = counters.score();
            observation.events.push(DerivedEvent {
                event_type: EVENT_MATCH_END,
                payload: json!({
                    "final_score": score.to_string(),
                    "result": score.outcome().as_str(),
                    "player_saves": counters.player_saves,
                    "player_shots": counters.player_shots,
                    "player_demos": counters.player_demos,
                    "opponent_saves": counters.opponent_saves,
                    "opponent_demos": counters.opponent_demos,
                }),
            });
            observation.finished = Some(score);
        }
        self.last_phase = Some(sample.phase);

        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(events: &[DerivedEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn counter_increase_yields_one_event_per_step() {
        let prev = CounterSample::default();
        let current = CounterSample {
            player_goals: 2,
            opponent_goals: 1,
            player_saves: 1,
            opponent_shots: 3,
            opponent_demos: 1,
            ..CounterSample::default()
        };

        let events = derive_events(&prev, &current);
        assert_eq!(
            types(&events),
            vec![
                "goal_scored",
                "goal_scored",
                "goal_conceded",
                "save",
                "shot",
                "shot",
                "shot",
                "demo"
            ]
        );
        assert_eq!(events[0].payload, json!({"score": "1-0"}));
        assert_eq!(events[1].payload, json!({"score": "2-0"}));
        assert_eq!(events[2].payload, json!({"score": "2-1"}));
        assert_eq!(events[3].payload, json!({"team": "player"}));
        assert_eq!(events[7].payload, json!({"team": "opponent"}));
    }

    #[test]
    fn counter_decrease_is_a_new_baseline() {
        let prev = CounterSample {
            player_shots: 4,
            player_goals: 1,
            ..CounterSample::default()
        };
        let reset = CounterSample::default();
        assert!(derive_events(&prev, &reset).is_empty());

        let after = CounterSample {
            player_shots: 1,
            ..CounterSample::default()
        };
        assert_eq!(types(&derive_events(&reset, &after)), vec!["shot"]);
    }

    #[test]
    fn implausible_jump_is_a_new_baseline() {
        let prev = CounterSample {
            player_goals: 1,
            opponent_shots: 2,
            ..CounterSample::default()
        };
        let glitch = CounterSample {
            player_goals: 2,
            player_shots: u32::MAX,
            opponent_shots: 2 + MAX_EVENTS_PER_TICK + 1,
            ..CounterSample::default()
        };
        assert_eq!(types(&derive_events(&prev, &glitch)), vec!["goal_scored"]);

        let busy = CounterSample {
            player_saves: MAX_EVENTS_PER_TICK,
            ..CounterSample::default()
        };
        let events = derive_events(&CounterSample::default(), &busy);
        assert_eq!(events.len(), MAX_EVENTS_PER_TICK as usize);
    }

    #[test]
    fn tracker_ignores_counters_before_kickoff() {
        let mut tracker = MatchTracker::new();
        let stale = CounterSample {
            player_goals: 3,
            opponent_goals: 2,
            ..CounterSample::default()
        };

        // Leftovers from a previous match become the baseline silently
        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Ended, stale));
        assert_eq!(obs, Observation::default());
        assert_eq!(tracker.score(), Score::default());
        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Countdown, CounterSample::default()));
        assert!(obs.events.is_empty());

        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Active, CounterSample::default()));
        assert!(obs.events.is_empty());
        let goal = CounterSample {
            player_goals: 1,
            ..CounterSample::default()
        };
        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Active, goal));
        assert_eq!(types(&obs.events), vec!["goal_scored"]);
        assert_eq!(tracker.score(), Score::new(1, 0));
    }

    #[test]
    fn tracker_reports_natural_end_once() {
        let mut tracker = MatchTracker::new();
        let final_counters = CounterSample {
            player_goals: 2,
            opponent_goals: 1,
            player_saves: 3,
            ..CounterSample::default()
        };

        tracker.observe(&RuntimeSample::new(MatchPhase::Active, CounterSample::default()));
        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Ended, final_counters));
        assert_eq!(obs.finished, Some(Score::new(2, 1)));
        let end = obs.events.last().unwrap();
        assert_eq!(end.event_type, "match_end");
        assert_eq!(end.payload["final_score"], "2-1");
        assert_eq!(end.payload["result"], "win");
        assert!(tracker.is_finished());

        let obs = tracker.observe(&RuntimeSample::new(MatchPhase::Ended, final_counters));
        assert_eq!(obs, Observation::default());
    }

    #[test]
    fn samples_decode_from_json_lines() {
        let sample: RuntimeSample =
            serde_json::from_str(r#"{"phase":"active","player_goals":1,"opponent_saves":2}"#)
                .unwrap();
        assert_eq!(sample.phase, MatchPhase::Active);
        assert_eq!(sample.counters.player_goals, 1);
        assert_eq!(sample.counters.opponent_saves, 2);

        let sample: RuntimeSample = serde_json::from_str(r#"{"phase":"go_to_kickoff"}"#).unwrap();
        assert_eq!(sample.phase, MatchPhase::Other);
    }
}
