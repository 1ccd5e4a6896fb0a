use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use anyhow::Context;
use matchlink_server::coach::RuleBasedCoach;
use matchlink_server::config::Config;
use matchlink_server::coordinator::Coordinator;
use matchlink_server::{serve, State};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let storage = config.open_storage()?;
    info!(
        backend = ?storage.backend(),
        tokens = config.tokens.len(),
        "Session store ready"
    );

    let state = State {
        coordinator: Arc::new(Coordinator::new(storage, Arc::new(RuleBasedCoach))),
        identities: Arc::new(config.tokens),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!("Webserver running on http://{addr}");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    };

    if let Err(e) = serve(listener, state, shutdown).await {
        error!("Shutdown error: {e}");
    }

    Ok(())
}
