use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use matchlink_agent::state::{self, InstanceLock, TokenFile};
use matchlink_agent::{Agent, BridgeRuntime, GameRuntime, HttpCoordinator, ScriptedRuntime, Timings};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "matchlink-agent")]
#[command(about = "Polls the matchlink coordinator and drives local matches")]
struct Cli {
    /// Coordinator base URL
    #[arg(long, env = "MATCHLINK_API", default_value = "http://127.0.0.1:8000")]
    api_url: String,

    /// Agent token issued by the website. Saved to the data dir once accepted.
    #[arg(long, env = "MATCHLINK_AGENT_TOKEN")]
    token: Option<String>,

    /// Folder-local state directory (will be created if missing)
    #[arg(long, env = "MATCHLINK_DATA_DIR", default_value = ".matchlink-agent")]
    data_dir: PathBuf,

    /// Runtime bridge command; the match file path is appended as the last argument
    #[arg(long, env = "MATCHLINK_RUNTIME_CMD")]
    runtime_cmd: Option<String>,

    /// Trained bot definition that replaces the built-in opponent
    #[arg(long, env = "MATCHLINK_CUSTOM_BOT")]
    custom_bot: Option<PathBuf>,

    /// Play a scripted 2-1 match instead of launching the game
    #[arg(long)]
    simulate: bool,

    /// Forget the saved token and exit
    #[arg(long)]
    logout: bool,
}

fn build_runtime(cli: &Cli) -> anyhow::Result<Box<dyn GameRuntime>> {
    if cli.simulate {
        info!("using scripted runtime");
        return Ok(Box::new(ScriptedRuntime::demo()));
    }
    let command = cli
        .runtime_cmd
        .as_deref()
        .context("no runtime configured: pass --runtime-cmd or --simulate")?;
    let mut runtime = BridgeRuntime::new(command, cli.data_dir.join("match"))?;
    if let Some(bot) = &cli.custom_bot {
        runtime = runtime.with_custom_bot(bot);
    }
    Ok(Box::new(runtime))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.logout {
        if state::delete_token(&cli.data_dir)? {
            info!("saved token removed");
        } else {
            info!("no saved token");
        }
        return Ok(());
    }

    let _lock = InstanceLock::acquire(&cli.data_dir)?;

    let saved = state::load_token(&cli.data_dir)?;
    let token = match (&cli.token, &saved) {
        (Some(token), _) => {
            state::save_token(
                &cli.data_dir,
                &TokenFile {
                    token: token.clone(),
                    api_url: Some(cli.api_url.clone()),
                },
            )?;
            token.clone()
        }
        (None, Some(saved)) => saved.token.clone(),
        (None, None) => anyhow::bail!("no agent token: pass --token or set MATCHLINK_AGENT_TOKEN"),
    };

    let runtime = build_runtime(&cli)?;
    let api = HttpCoordinator::new(cli.api_url.clone(), token);
    info!(api_url = %api.base_url(), data_dir = %cli.data_dir.display(), "connecting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
        let _ = shutdown_tx.send(true);
    });

    Agent::new(Arc::new(api), runtime, Timings::default())
        .run(shutdown_rx)
        .await
}
