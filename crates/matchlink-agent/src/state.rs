//! On-disk agent state: the saved agent token and the single-instance lock.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const TOKEN_FILE_NAME: &str = "token.json";
pub const LOCK_FILE_NAME: &str = "agent.lock";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenFile {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("mkdir {}", dir.display()))?;
    Ok(())
}

pub fn load_token(data_dir: &Path) -> Result<Option<TokenFile>> {
    let path = data_dir.join(TOKEN_FILE_NAME);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let file: TokenFile = serde_json::from_str(&raw).context("parse token json")?;
    Ok(Some(file))
}

pub fn save_token(data_dir: &Path, file: &TokenFile) -> Result<PathBuf> {
    ensure_dir(data_dir)?;
    let path = data_dir.join(TOKEN_FILE_NAME);
    std::fs::write(&path, format!("{}\n", serde_json::to_string_pretty(file)?))
        .context("write token json")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(path)
}

/// Returns whether a token file was removed.
pub fn delete_token(data_dir: &Path) -> Result<bool> {
    let path = data_dir.join(TOKEN_FILE_NAME);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Pid file held for the agent's lifetime. Removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        ensure_dir(data_dir)?;
        let path = data_dir.join(LOCK_FILE_NAME);

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .with_context(|| format!("write {}", path.display()))?;
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = std::fs::read_to_string(&path)
                        .ok()
                        .and_then(|raw| raw.trim().parse::<u32>().ok());
                    match holder {
                        Some(pid) if pid_alive(pid) => {
                            anyhow::bail!("another agent is already running (pid {pid})")
                        }
                        _ => {
                            warn!(path = %path.display(), "removing stale agent lock");
                            std::fs::remove_file(&path)
                                .with_context(|| format!("remove {}", path.display()))?;
                        }
                    }
                }
                Err(e) => return Err(e).with_context(|| format!("create {}", path.display())),
            }
        }
        anyhow::bail!("could not acquire agent lock {}", path.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove agent lock {}: {e}", self.path.display());
        } else {
            info!("released agent lock");
        }
    }
}
