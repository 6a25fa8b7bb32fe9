//! Ordering descriptor for paged queries.
//!
//! `OrderBy::field` is free text at this layer; each store resolves it
//! against its own column allow-list and rejects anything else.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(OrderError::UnknownDirection(other.to_string())),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("unknown order direction `{0}`")]
    UnknownDirection(String),
    #[error("field `{0}` does not exist")]
    UnknownField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Parses `field` or `field,DIRECTION`; the direction defaults to ASC.
    pub fn parse(value: &str, default: &OrderBy) -> Result<Self, OrderError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(default.clone());
        }
        match value.split_once(',') {
            Some((field, direction)) => Ok(Self::new(field.trim(), Direction::parse(direction)?)),
            None => Ok(Self::new(value, Direction::Asc)),
        }
    }

    /// Renders an `ORDER BY` clause, mapping the field through `allowed`.
    pub fn to_sql_clause(
        &self,
        allowed: &HashMap<&'static str, &'static str>,
    ) -> Result<String, OrderError> {
        let column = allowed
            .get(self.field.as_str())
            .ok_or_else(|| OrderError::UnknownField(self.field.clone()))?;
        Ok(format!(" ORDER BY {column} {}", self.direction.as_sql()))
    }
}

impl Display for OrderBy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.field, self.direction.as_sql())
    }
}
