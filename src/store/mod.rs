//! SQLite-backed persistence for accounts, groups, feedback and the audit trail.
//!
//! Tables:
//! - `accounts`: username, password_hash, first/last name, role, group_name, active
//! - `user_groups`: group_name, active
//! - `feedback`: id, username, group_name, subject, level, problems, notes, created_at
//! - `audit_logs`: id, username, action, timestamp (append-only, enforced by triggers)
//!
//! Every unit of work checks a connection out of an `r2d2` pool and hands it
//! back when the guard drops, so a failed request never leaks a connection.
//! Mutations that must be audited run through [`Database::transaction`] so
//! the primary write and the audit write commit together.

pub mod accounts;
pub mod audit;
pub mod feedback;
pub mod groups;

pub use accounts::{Account, AccountUpdate, NewAccount};
pub use audit::{AuditEntry, AuditView};
pub use feedback::{FeedbackRecord, NewFeedback, ReportRow};
pub use groups::Group;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use std::path::Path;
use std::time::Duration;

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// How long a writer waits on SQLite's page lock before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors raised by the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Pooled handle to the application database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database at `path` and install the schema.
    pub fn open(path: &Path, pool_size: u32) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
            // WAL mode for concurrent reads + crash safety
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                username      TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                first_name    TEXT NOT NULL DEFAULT '',
                last_name     TEXT NOT NULL DEFAULT '',
                role          TEXT NOT NULL DEFAULT '',
                group_name    TEXT NOT NULL DEFAULT '',
                active        INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS user_groups (
                group_name TEXT PRIMARY KEY,
                active     INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                username   TEXT NOT NULL,
                group_name TEXT NOT NULL DEFAULT '',
                subject    TEXT NOT NULL DEFAULT '',
                level      TEXT NOT NULL DEFAULT '',
                problems   TEXT NOT NULL DEFAULT '',
                notes      TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                username  TEXT,
                action    TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
            BEFORE UPDATE ON audit_logs
            BEGIN
                SELECT RAISE(ABORT, 'audit log is append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS audit_logs_no_delete
            BEFORE DELETE ON audit_logs
            BEGIN
                SELECT RAISE(ABORT, 'audit log is append-only');
            END;",
        )?;
        Ok(())
    }

    /// Check out a pooled connection. Returned to the pool on drop.
    pub fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a single transaction. Commits only if `f` succeeds;
    /// any error (including one from an audit write) rolls everything back.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

/// Map a UNIQUE/PRIMARY KEY violation onto [`StoreError::Conflict`].
pub(crate) fn conflict_on_constraint(err: rusqlite::Error, message: String) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message)
        }
        other => other.into(),
    }
}

/// Decode an RFC 3339 column written by this module.
pub(crate) fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
