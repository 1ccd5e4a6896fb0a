//! Agent main loop and the per-match driver.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use matchlink_protocol::{
    AgentCommand, CompleteMatchRequest, EVENT_MATCH_START, MatchConfig, ReportEventRequest, Score,
};
use serde_json::json;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::CoordinatorApi;
use crate::runtime::GameRuntime;
use crate::sample::MatchTracker;

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(3);
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub poll: Duration,
    pub heartbeat: Duration,
    pub sample: Duration,
    pub stop_check: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll: POLL_INTERVAL,
            heartbeat: HEARTBEAT_INTERVAL,
            sample: SAMPLE_INTERVAL,
            stop_check: STOP_CHECK_INTERVAL,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

/// Doubling delay, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2),
        }
        .min(self.max);
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    /// The runtime reported the end of the match.
    Finished,
    /// The coordinator relayed a stop request.
    Stopped,
    /// The runtime stopped answering.
    RuntimeLost,
    /// The agent is shutting down.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub session_id: String,
    pub end: MatchEnd,
    pub score: Score,
    pub completed: bool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub struct MatchRunner {
    api: Arc<dyn CoordinatorApi>,
    runtime: Mutex<Box<dyn GameRuntime>>,
    timings: Timings,
    in_flight: AtomicBool,
}

impl MatchRunner {
    pub fn new(
        api: Arc<dyn CoordinatorApi>,
        runtime: Box<dyn GameRuntime>,
        timings: Timings,
    ) -> Self {
        Self {
            api,
            runtime: Mutex::new(runtime),
            timings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_driving(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs one match to its end and reports completion.
    ///
    /// Returns `Ok(None)` without touching the runtime when another match is
    /// already being driven.
    pub async fn drive(
        &self,
        session_id: &str,
        config: &MatchConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Option<MatchReport>> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!(session_id, "match already in flight, ignoring start");
            return Ok(None);
        }
        let _in_flight = InFlight(&self.in_flight);

        let mut runtime = self.runtime.lock().await;
        if let Err(err) = runtime.launch(session_id, config).await {
            error!(session_id, "runtime launch failed: {err:#}");
            if let Err(e) = runtime.shutdown().await {
                warn!(session_id, "runtime cleanup failed: {e:#}");
            }
            return Err(err.context("launch runtime"));
        }
        info!(session_id, difficulty = %config.difficulty, "match started");
        let started = Instant::now();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sender = tokio::spawn(send_events(self.api.clone(), event_rx));
        let _ = event_tx.send(ReportEventRequest {
            session_id: session_id.to_string(),
            elapsed_ms: 0,
            event_type: EVENT_MATCH_START.to_string(),
            payload: json!({
                "mode": config.mode,
                "difficulty": config.difficulty,
                "opponent_style": config.opponent_style,
            }),
        });

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let watcher = tokio::spawn(watch_for_stop(
            self.api.clone(),
            session_id.to_string(),
            self.timings.stop_check,
            stop_tx,
        ));

        let mut tracker = MatchTracker::new();
        let mut ticker = tokio::time::interval(self.timings.sample);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_open = true;
        let mut shutdown_open = true;

        let end = loop {
            if *shutdown.borrow() {
                break MatchEnd::Interrupted;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let sample = match runtime.sample().await {
                        Ok(Some(sample)) => sample,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(session_id, "runtime sample failed: {e:#}");
                            break MatchEnd::RuntimeLost;
                        }
                    };
                    let observation = tracker.observe(&sample);
                    let elapsed_ms = elapsed_ms(started);
                    for event in observation.events {
                        let _ = event_tx.send(ReportEventRequest {
                            session_id: session_id.to_string(),
                            elapsed_ms,
                            event_type: event.event_type.to_string(),
                            payload: event.payload,
                        });
                    }
                    if let Some(score) = observation.finished {
                        info!(session_id, score = %score, "match finished");
                        break MatchEnd::Finished;
                    }
                }
                res = stop_rx.changed(), if stop_open => match res {
                    Ok(()) if *stop_rx.borrow() => break MatchEnd::Stopped,
                    Ok(()) => {}
                    Err(_) => stop_open = false,
                },
                res = shutdown.changed(), if shutdown_open => {
                    if res.is_err() {
                        shutdown_open = false;
                    }
                }
            }
        };

        watcher.abort();
        drop(event_tx);
        match sender.await {
            Ok(sent) => debug!(session_id, sent, "event queue drained"),
            Err(e) => warn!(session_id, "event sender task failed: {e}"),
        }

        if let Err(e) = runtime.shutdown().await {
            warn!(session_id, "runtime shutdown failed: {e:#}");
        }
        drop(runtime);

        let score = tracker.score();
        let completed = self
            .report_completion(session_id, score, &mut shutdown)
            .await;
        Ok(Some(MatchReport {
            session_id: session_id.to_string(),
            end,
            score,
            completed,
        }))
    }

    /// Reports the final score.
    ///
    /// Transient failures are retried with capped backoff until the report
    /// lands or `shutdown` fires. A definitive rejection ends the attempt.
    pub async fn report_completion(
        &self,
        session_id: &str,
        score: Score,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let request = CompleteMatchRequest {
            session_id: session_id.to_string(),
            player_score: score.player,
            opponent_score: score.opponent,
        };
        let mut backoff = Backoff::new(self.timings.initial_backoff, self.timings.max_backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let err = match self.api.complete(&request).await {
                Ok(resp) => {
                    info!(session_id, score = %resp.score, "completion reported");
                    return true;
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => {
                    error!(session_id, attempt, "completion rejected: {e}");
                    return false;
                }
            };

            if *shutdown.borrow() {
                warn!(session_id, attempt, "shutting down with completion unreported: {err}");
                return false;
            }
            let delay = backoff.next_delay();
            warn!(
                session_id,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                "completion report failed: {err}"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        warn!(session_id, attempt, "shutting down with completion unreported");
                        return false;
                    }
                }
            }
        }
    }
}

async fn send_events(
    api: Arc<dyn CoordinatorApi>,
    mut events: mpsc::UnboundedReceiver<ReportEventRequest>,
) -> usize {
    let mut sent = 0;
    while let Some(event) = events.recv().await {
        match api.report_event(&event).await {
            Ok(_) => sent += 1,
            Err(e) => warn!(
                session_id = %event.session_id,
                event_type = %event.event_type,
                "dropping event: {e}"
            ),
        }
    }
    sent
}

async fn watch_for_stop(
    api: Arc<dyn CoordinatorApi>,
    session_id: String,
    period: Duration,
    stop: watch::Sender<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match api.poll().await {
            Ok(AgentCommand::StopMatch { session_id: id }) if id == session_id => {
                info!(session_id = %id, "stop requested");
                let _ = stop.send(true);
                return;
            }
            Ok(AgentCommand::StartMatch { session_id: other, .. }) => {
                warn!(current = %session_id, ignored = %other, "start received mid-match, ignoring");
            }
            Ok(_) => {}
            Err(e) => debug!(session_id = %session_id, "stop check failed: {e}"),
        }
    }
}

async fn heartbeat_loop(api: Arc<dyn CoordinatorApi>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = api.heartbeat().await {
            debug!("heartbeat failed: {e}");
        }
    }
}

/// The long-running agent: heartbeats, polls, and drives matches one at a time.
pub struct Agent {
    api: Arc<dyn CoordinatorApi>,
    runner: MatchRunner,
    timings: Timings,
}

impl Agent {
    pub fn new(
        api: Arc<dyn CoordinatorApi>,
        runtime: Box<dyn GameRuntime>,
        timings: Timings,
    ) -> Self {
        Self {
            runner: MatchRunner::new(api.clone(), runtime, timings),
            api,
            timings,
        }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let heartbeat: JoinHandle<()> =
            tokio::spawn(heartbeat_loop(self.api.clone(), self.timings.heartbeat));
        let mut backoff = Backoff::new(self.timings.initial_backoff, self.timings.max_backoff);
        let mut finalized_stops = HashSet::new();
        info!("agent started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.api.poll().await {
                Ok(command) => {
                    backoff.reset();
                    self.handle(command, &shutdown, &mut finalized_stops).await;
                    self.timings.poll
                }
                Err(e) if e.is_retryable() => {
                    let delay = backoff.next_delay();
                    warn!(retry_in_ms = delay.as_millis() as u64, "coordinator unreachable: {e}");
                    delay
                }
                Err(e) => {
                    warn!("poll failed: {e}");
                    self.timings.poll
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        heartbeat.abort();
        info!("agent stopped");
        Ok(())
    }

    async fn handle(
        &self,
        command: AgentCommand,
        shutdown: &watch::Receiver<bool>,
        finalized_stops: &mut HashSet<String>,
    ) {
        match command {
            AgentCommand::Idle => {}
            AgentCommand::StartMatch { session_id, config } => {
                match self.runner.drive(&session_id, &config, shutdown.clone()).await {
                    Ok(Some(report)) => info!(
                        session_id = %report.session_id,
                        end = ?report.end,
                        score = %report.score,
                        completed = report.completed,
                        "match done"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(session_id = %session_id, "match failed: {e:#}"),
                }
            }
            AgentCommand::StopMatch { session_id } => {
                // Stopped before this agent launched anything
                if finalized_stops.insert(session_id.clone()) {
                    info!(session_id = %session_id, "finalizing match stopped before launch");
                    let mut shutdown = shutdown.clone();
                    self.runner
                        .report_completion(&session_id, Score::default(), &mut shutdown)
                        .await;
                }
            }
        }
    }
}
