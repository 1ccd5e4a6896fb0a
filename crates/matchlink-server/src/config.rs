use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use matchlink_memory_store::MatchlinkMemoryStorage;
use matchlink_sqlite_store::MatchlinkSqliteStorage;
use matchlink_store_traits::MatchStorage;
use tracing::{info, warn};

use crate::identity::TokenDirectory;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub db_path: Option<PathBuf>,
    pub tokens: TokenDirectory,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = lookup("MATCHLINK_PORT")
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.trim().parse::<u16>())
            .transpose()
            .context("MATCHLINK_PORT must be a port number")?
            .unwrap_or(DEFAULT_PORT);

        let db_path = lookup("MATCHLINK_DB_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let tokens = TokenDirectory::parse(&lookup("MATCHLINK_TOKENS").unwrap_or_default())
            .context("parse MATCHLINK_TOKENS")?;
        if tokens.is_empty() {
            warn!("MATCHLINK_TOKENS is empty; every request will be rejected as unauthorized");
        }

        Ok(Self {
            port,
            db_path,
            tokens,
        })
    }

    pub fn open_storage(&self) -> anyhow::Result<Arc<dyn MatchStorage>> {
        match &self.db_path {
            Some(path) => {
                let storage = MatchlinkSqliteStorage::new(path)
                    .with_context(|| format!("open session database {}", path.display()))?;
                info!(path = %path.display(), "Using SQLite session store");
                Ok(Arc::new(storage))
            }
            None => {
                warn!("MATCHLINK_DB_PATH not set; sessions are kept in memory and lost on restart");
                Ok(Arc::new(MatchlinkMemoryStorage::default()))
            }
        }
    }
}
