//! Storer contracts, SQLite implementations and storer decorators.
//!
//! # Responsibility
//! - Define one storer trait per entity (`UserStorer`, `ProductStorer`,
//!   `UserSummaryStorer`); concrete stores and decorators implement the same
//!   trait so they compose at construction time.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Stores classify only what they can distinguish (duplicate key, not
//!   found); every other backing error is wrapped with the operation name.
//! - Every operation checks its `RequestContext` before issuing I/O.
//! - `execute_under_transaction` is pure construction and never performs I/O.

use crate::context::ContextError;
use crate::db::tx::TransactionHandle;
use crate::db::DbError;
use crate::model::order::OrderError;
use crate::model::page::PageError;
use rusqlite::Connection;
use thiserror::Error;

mod sql;
pub mod product_repo;
pub mod user_cache;
pub mod user_repo;
pub mod user_summary_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level error taxonomy shared by every storer.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("duplicate key: {detail}")]
    DuplicateKey { detail: String },
    #[error("transaction handle does not carry a sqlite connection")]
    InvalidTransactionHandle,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("{op}: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        sql::classify("sqlite", value)
    }
}

impl From<OrderError> for RepoError {
    fn from(value: OrderError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<PageError> for RepoError {
    fn from(value: PageError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Resolves the SQLite connection carried by `tx`.
///
/// Fails with `InvalidTransactionHandle` for handles that are not
/// SQLite-backed.
pub(crate) fn rebind_connection(tx: &dyn TransactionHandle) -> RepoResult<&Connection> {
    tx.sqlite_connection()
        .ok_or(RepoError::InvalidTransactionHandle)
}
