//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Components call store methods; they never execute SQL directly.
//!
//! The store holds the two things that must outlive a process: the
//! activity history the windowed rules query, and the append-only audit
//! journal. The connection sits behind a mutex that is held for a single
//! statement at a time.

use crate::error::AmlResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;

mod audit;
mod history;

pub use history::ActivityRecord;

pub struct AmlStore {
    conn: Mutex<Connection>,
}

impl AmlStore {
    pub fn open(path: &str) -> AmlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AmlResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AmlResult<()> {
        self.conn
            .lock()
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(col: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(col, ms))
}
