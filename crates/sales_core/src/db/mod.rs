//! SQLite storage bootstrap, schema migrations and transaction plumbing.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the sales core.
//! - Apply schema migrations in deterministic order.
//! - Provide the request-scoped transaction manager and the handle type
//!   storers rebind onto.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.

use thiserror::Error;

pub mod migrations;
mod open;
pub mod tx;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}
