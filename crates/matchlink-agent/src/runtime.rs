//! Game runtime adapters.
//!
//! The runtime is a black box: launched with a match configuration, sampled
//! periodically for counter state, shut down when the match ends or is stopped.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use matchlink_protocol::MatchConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::match_file::write_match_file;
use crate::sample::{CounterSample, MatchPhase, RuntimeSample};

#[async_trait]
pub trait GameRuntime: Send {
    async fn launch(&mut self, session_id: &str, config: &MatchConfig) -> anyhow::Result<()>;

    /// Latest state, or `None` while the runtime has not produced any yet.
    async fn sample(&mut self) -> anyhow::Result<Option<RuntimeSample>>;

    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Replays a fixed list of samples, one per call, then repeats the last one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRuntime {
    script: Vec<RuntimeSample>,
    cursor: usize,
    launches: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl ScriptedRuntime {
    pub fn new(script: Vec<RuntimeSample>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// A short 2-1 win used by `--simulate`.
    pub fn demo() -> Self {
        let mut script = vec![RuntimeSample::new(MatchPhase::Countdown, CounterSample::default())];
        let mut counters = CounterSample::default();
        let beats: [fn(&mut CounterSample); 8] = [
            |c| c.player_shots += 1,
            |c| c.opponent_saves += 1,
            |c| c.opponent_shots += 1,
            |c| c.opponent_goals += 1,
            |c| {
                c.player_shots += 1;
                c.player_goals += 1;
            },
            |c| c.player_saves += 1,
            |c| c.player_demos += 1,
            |c| {
                c.player_shots += 1;
                c.player_goals += 1;
            },
        ];
        for beat in beats {
            for _ in 0..4 {
                script.push(RuntimeSample::new(MatchPhase::Active, counters));
            }
            beat(&mut counters);
            script.push(RuntimeSample::new(MatchPhase::Active, counters));
        }
        script.push(RuntimeSample::new(MatchPhase::Ended, counters));
        Self::new(script)
    }

    pub fn launches(&self) -> Arc<AtomicUsize> {
        self.launches.clone()
    }

    pub fn shutdowns(&self) -> Arc<AtomicUsize> {
        self.shutdowns.clone()
    }
}

#[async_trait]
impl GameRuntime for ScriptedRuntime {
    async fn launch(&mut self, session_id: &str, config: &MatchConfig) -> anyhow::Result<()> {
        self.cursor = 0;
        self.launches.fetch_add(1, Ordering::SeqCst);
        debug!(session_id, difficulty = %config.difficulty, "scripted runtime launched");
        Ok(())
    }

    async fn sample(&mut self) -> anyhow::Result<Option<RuntimeSample>> {
        let Some(last) = self.script.len().checked_sub(1) else {
            return Ok(None);
        };
        let sample = self.script[self.cursor.min(last)];
        self.cursor += 1;
        Ok(Some(sample))
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runs an external bridge process that owns the real game.
///
/// The bridge is started as `<command...> <match file>` and writes one JSON
/// [`RuntimeSample`] per line to stdout. Stopping the match kills it.
pub struct BridgeRuntime {
    command: Vec<String>,
    match_dir: PathBuf,
    custom_bot: Option<PathBuf>,
    running: Option<RunningBridge>,
}

struct RunningBridge {
    child: Child,
    latest: watch::Receiver<Option<RuntimeSample>>,
    reader: JoinHandle<()>,
    exit: Option<ExitStatus>,
}

impl BridgeRuntime {
    pub fn new(command: &str, match_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            anyhow::bail!("runtime command must not be empty");
        }
        Ok(Self {
            command,
            match_dir: match_dir.into(),
            custom_bot: None,
            running: None,
        })
    }

    pub fn with_custom_bot(mut self, bot: impl Into<PathBuf>) -> Self {
        self.custom_bot = Some(bot.into());
        self
    }
}

#[async_trait]
impl GameRuntime for BridgeRuntime {
    async fn launch(&mut self, session_id: &str, config: &MatchConfig) -> anyhow::Result<()> {
        if self.running.is_some() {
            self.shutdown().await?;
        }

        let match_file = write_match_file(&self.match_dir, config, self.custom_bot.as_deref())?;
        let (program, args) = self
            .command
            .split_first()
            .context("runtime command must not be empty")?;

        let mut child = Command::new(program)
            .args(args)
            .arg(&match_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn runtime bridge `{program}`"))?;
        let stdout = child
            .stdout
            .take()
            .context("runtime bridge stdout not captured")?;

        let (tx, latest) = watch::channel(None);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<RuntimeSample>(&line) {
                        Ok(sample) => {
                            tx.send_replace(Some(sample));
                        }
                        Err(_) => debug!(line = %line, "ignoring non-sample bridge output"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("runtime bridge stdout read failed: {e}");
                        break;
                    }
                }
            }
        });

        info!(
            session_id,
            pid = child.id(),
            match_file = %match_file.display(),
            "runtime bridge started"
        );
        self.running = Some(RunningBridge {
            child,
            latest,
            reader,
            exit: None,
        });
        Ok(())
    }

    async fn sample(&mut self) -> anyhow::Result<Option<RuntimeSample>> {
        let Some(bridge) = self.running.as_mut() else {
            anyhow::bail!("runtime bridge is not running");
        };

        // After the bridge exits, the final sample is handed out once more
        if let Some(status) = bridge.exit {
            anyhow::bail!("runtime bridge exited ({status})");
        }
        if bridge.reader.is_finished()
            && let Some(status) = bridge.child.try_wait().context("poll runtime bridge")?
        {
            bridge.exit = Some(status);
        }
        Ok(*bridge.latest.borrow())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        let Some(mut bridge) = self.running.take() else {
            return Ok(());
        };
        bridge.reader.abort();
        if bridge.exit.is_none() && bridge.child.try_wait()?.is_none() {
            bridge
                .child
                .kill()
                .await
                .context("kill runtime bridge")?;
            info!("runtime bridge stopped");
        }
        Ok(())
    }
}
