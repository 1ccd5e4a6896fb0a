//! SQLite-based storage implementation for matchlink.
//!
//! This crate provides a SQLite-based implementation of the [`MatchStorage`]
//! trait, used by the coordinator when a database path is configured.
//!
//! The schema is managed with embedded `refinery` migrations. Timestamps are
//! stored as unix milliseconds, match configuration, summaries and event
//! payloads as JSON text.
//!
//! All access goes through a single connection behind a mutex. Conditional
//! session updates additionally run inside a savepoint so the read-validate-write
//! sequence is atomic with respect to other processes sharing the file.
//!
//! ```no_run
//! use matchlink_sqlite_store::MatchlinkSqliteStorage;
//!
//! let storage = MatchlinkSqliteStorage::new("/var/lib/matchlink/sessions.db")?;
//! # Ok::<(), matchlink_sqlite_store::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use matchlink_store_traits::{Backend, MatchStorage};
use rusqlite::Connection;

mod db;
pub mod error;
mod events;
mod migrations;
mod sessions;
mod validation;

use self::error::Error;

/// A SQLite-based storage implementation for matchlink.
pub struct MatchlinkSqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for MatchlinkSqliteStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchlinkSqliteStorage").finish_non_exhaustive()
    }
}

impl MatchlinkSqliteStorage {
    /// Opens (or creates) the database at `file_path` and applies migrations.
    ///
    /// Missing parent directories are created.
    pub fn new<P>(file_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(file_path)?;
        tracing::debug!(path = %file_path.display(), "Opened SQLite session store");

        Self::from_connection(connection)
    }

    /// Creates a new in-memory SQLite storage.
    pub fn new_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut connection: Connection) -> Result<Self, Error> {
        connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;

        migrations::run_migrations(&mut connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub(crate) fn with_connection<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Connection) -> T,
    {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}

impl MatchStorage for MatchlinkSqliteStorage {
    fn backend(&self) -> Backend {
        Backend::SQLite
    }
}
