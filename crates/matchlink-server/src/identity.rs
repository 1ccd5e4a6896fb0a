//! Caller identity.
//!
//! Tokens are issued elsewhere; the service only maps a presented token to the
//! user it was issued for. Agents present theirs in `X-Agent-Token`, the
//! front-end as an `Authorization: Bearer` credential.

use std::collections::HashMap;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use matchlink_protocol::AGENT_TOKEN_HEADER;
use matchlink_store_traits::UserId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing {0} credential")]
    Missing(&'static str),
    #[error("unknown {0} credential")]
    Unknown(&'static str),
}

#[derive(Clone, Debug, Default)]
pub struct TokenDirectory {
    tokens: HashMap<String, UserId>,
}

impl TokenDirectory {
    /// Parses `token=user` pairs separated by commas.
    pub fn parse(entries: &str) -> anyhow::Result<Self> {
        let mut tokens = HashMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((token, user)) = entry.split_once('=') else {
                anyhow::bail!("token entry `{entry}` is not of the form token=user");
            };
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                anyhow::bail!("token entry `{entry}` has an empty token or user");
            }
            if tokens
                .insert(token.to_string(), UserId::new(user))
                .is_some()
            {
                anyhow::bail!("token for user `{user}` is listed more than once");
            }
        }
        Ok(Self { tokens })
    }

    pub fn insert(&mut self, token: impl Into<String>, user: UserId) {
        self.tokens.insert(token.into(), user);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn resolve(&self, token: &str) -> Option<&UserId> {
        self.tokens.get(token)
    }

    pub fn agent(&self, headers: &HeaderMap) -> Result<UserId, IdentityError> {
        let token = headers
            .get(AGENT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(IdentityError::Missing("agent"))?;
        self.resolve(token)
            .cloned()
            .ok_or(IdentityError::Unknown("agent"))
    }

    pub fn bearer(&self, headers: &HeaderMap) -> Result<UserId, IdentityError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(IdentityError::Missing("bearer"))?;
        self.resolve(token)
            .cloned()
            .ok_or(IdentityError::Unknown("bearer"))
    }
}
