//! Matchlink storage - storage traits and types for coordination sessions and
//! their append-only event logs.
//!
//! Backends implement [`sessions::SessionStorage`] and [`events::EventStorage`];
//! [`MatchStorage`] ties them together for the coordinator.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod error;
pub mod events;
pub mod ids;
pub mod sessions;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::StoreError;
pub use ids::{EventId, SessionId, UserId};

use self::events::EventStorage;
use self::sessions::SessionStorage;

/// Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Memory
    Memory,
    /// SQLite
    SQLite,
}

impl Backend {
    /// Check if it's a persistent backend
    ///
    /// All values different from [`Backend::Memory`] are considered persistent
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// Storage provider for matchlink.
///
/// Implementors must provide:
/// - Session storage with conditional updates
/// - Event storage for the per-session event log
pub trait MatchStorage: SessionStorage + EventStorage + Send + Sync {
    /// Returns the backend type.
    fn backend(&self) -> Backend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_persistence() {
        assert!(!Backend::Memory.is_persistent());
        assert!(Backend::SQLite.is_persistent());
    }
}
