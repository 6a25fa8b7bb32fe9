//! SQL helpers shared by the SQLite stores.

use super::{RepoError, RepoResult};
use crate::model::page::Page;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{ffi, ErrorCode};
use uuid::Uuid;

/// Attaches an operation name to a rusqlite result and classifies
/// uniqueness violations as `DuplicateKey`.
pub(crate) trait SqlResultExt<T> {
    fn op(self, op: &'static str) -> RepoResult<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn op(self, op: &'static str) -> RepoResult<T> {
        self.map_err(|source| classify(op, source))
    }
}

pub(crate) fn classify(op: &'static str, source: rusqlite::Error) -> RepoError {
    if is_unique_violation(&source) {
        return RepoError::DuplicateKey {
            detail: format!("{op}: {source}"),
        };
    }
    RepoError::Sqlite { op, source }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Incrementally built `WHERE` clause with positional bind values.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    sql: String,
    binds: Vec<Value>,
}

impl WhereClause {
    pub(crate) fn push(&mut self, condition: &str, value: Value) {
        self.sql.push_str(" AND ");
        self.sql.push_str(condition);
        self.binds.push(value);
    }

    /// Literal substring match; `%` and `_` in `needle` match themselves.
    pub(crate) fn push_contains(&mut self, column: &str, needle: &str) {
        let escaped = needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        self.push(
            &format!("{column} LIKE ? ESCAPE '\\'"),
            Value::Text(format!("%{escaped}%")),
        );
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn into_binds(self) -> Vec<Value> {
        self.binds
    }
}

pub(crate) fn millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub(crate) fn parse_millis(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}"))
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

/// `IN (?, ?, ...)` placeholder list for `count` values.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// `LIMIT` and `OFFSET` binds for `page`.
pub(crate) fn page_binds(page: Page) -> RepoResult<(Value, Value)> {
    let offset = i64::try_from(page.offset()).map_err(|_| {
        RepoError::Validation(format!("page offset {} is out of range", page.offset()))
    })?;
    Ok((
        Value::Integer(i64::from(page.rows_per_page())),
        Value::Integer(offset),
    ))
}
