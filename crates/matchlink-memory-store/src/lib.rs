//! Memory-based storage implementation for matchlink.
//!
//! This crate provides an in-memory implementation of the `MatchStorage` trait.
//! Memory-based storage is non-persistent and will be cleared when the process
//! terminates. It backs the coordinator in tests and when no database path is
//! configured.
//!
//! All state lives behind a single [`parking_lot::RwLock`], so a conditional
//! `update_session` reads and writes the stored row under one write guard.
//!
//! ## Memory Exhaustion Protection
//!
//! Event logs are appended to by an untrusted agent, so the number of events
//! kept per session is capped by [`ValidationLimits::max_events_per_session`]
//! (default [`DEFAULT_MAX_EVENTS_PER_SESSION`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use matchlink_store_traits::events::MAX_EVENTS_PER_SESSION;
use matchlink_store_traits::events::types::Event;
use matchlink_store_traits::sessions::types::Session;
use matchlink_store_traits::{Backend, EventId, MatchStorage, SessionId};
use parking_lot::RwLock;

mod events;
mod sessions;

/// Default maximum number of events stored per session, shared with every
/// other backend.
pub const DEFAULT_MAX_EVENTS_PER_SESSION: usize = MAX_EVENTS_PER_SESSION;

/// Configurable validation limits for memory storage.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    /// Maximum number of events stored per session
    pub max_events_per_session: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_events_per_session: DEFAULT_MAX_EVENTS_PER_SESSION,
        }
    }
}

impl ValidationLimits {
    /// Creates a new `ValidationLimits` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of events stored per session.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_max_events_per_session(mut self, limit: usize) -> Self {
        assert!(limit > 0, "max_events_per_session must be greater than 0");
        self.max_events_per_session = limit;
        self
    }
}

#[derive(Default)]
struct MemoryStorageInner {
    sessions: HashMap<SessionId, Session>,
    events: HashMap<SessionId, Vec<Event>>,
    event_ids: HashSet<EventId>,
}

/// An in-memory implementation of the `MatchStorage` trait.
pub struct MatchlinkMemoryStorage {
    inner: RwLock<MemoryStorageInner>,
    limits: ValidationLimits,
}

impl fmt::Debug for MatchlinkMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MatchlinkMemoryStorage")
            .field("sessions", &inner.sessions.len())
            .field("events", &inner.event_ids.len())
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for MatchlinkMemoryStorage {
    fn default() -> Self {
        Self::with_limits(ValidationLimits::default())
    }
}

impl MatchlinkMemoryStorage {
    /// Creates a new in-memory storage with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory storage with custom validation limits.
    pub fn with_limits(limits: ValidationLimits) -> Self {
        Self {
            inner: RwLock::new(MemoryStorageInner::default()),
            limits,
        }
    }

    /// Returns the validation limits in effect.
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }
}

impl MatchStorage for MatchlinkMemoryStorage {
    fn backend(&self) -> Backend {
        Backend::Memory
    }
}

/// Newest first: `created_at DESC, id DESC`. Matches the SQLite ordering.
fn sort_newest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
