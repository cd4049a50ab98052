//! SQLite persistence layer for the assignment audit log.
//!
//! RULE: Only store/ talks to the database.
//! The recorder calls store methods and never executes SQL directly.
//! The log is append-only; there are no update or delete methods.

mod assignment;

use crate::error::DeskResult;
use rusqlite::Connection;

pub struct DeskStore {
    conn: Connection,
}

impl DeskStore {
    /// Open (or create) the assignment database at `path`.
    pub fn open(path: &str) -> DeskResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is advisory; some filesystems refuse it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DeskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to run on every start.
    pub fn migrate(&self) -> DeskResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_assignment_log.sql"))?;
        Ok(())
    }

    /// Open and migrate in one step.
    pub fn open_migrated(path: &str) -> DeskResult<Self> {
        let store = if path == ":memory:" {
            Self::in_memory()?
        } else {
            Self::open(path)?
        };
        store.migrate()?;
        Ok(store)
    }

    /// Raw connection for tests that check storage-level guarantees.
    #[doc(hidden)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
