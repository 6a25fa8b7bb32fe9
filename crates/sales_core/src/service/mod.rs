//! Entity cores.
//!
//! # Responsibility
//! - Apply business rules (validation, hashing, timestamps) on top of an
//!   injected storer composition.
//! - Translate storage failures into the domain error taxonomy.
//! - Emit domain events for committed state transitions.
//!
//! # Invariants
//! - Duplicate-key and not-found storage failures are always reported as
//!   `NonUniqueKey` / `NotFound`, never as `BackingStore`.
//! - Events are emitted only after the storer call succeeded.

use crate::clock::{truncate_to_millis, Clock};
use crate::event::{DomainEvent, EventSink};
use crate::hash::HashError;
use crate::repo::RepoError;
use chrono::{DateTime, TimeDelta, Utc};
use log::error;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub mod product_service;
pub mod user_service;
pub mod user_summary_service;

pub type CoreResult<T> = Result<T, CoreError>;

/// Domain-level error returned by every core operation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("key is not unique: {key}")]
    NonUniqueKey { key: String },
    #[error("transaction handle is not usable by this store")]
    InvalidTransactionHandle,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("user is disabled")]
    UserDisabled,
    #[error("authentication failed")]
    AuthenticationFailure,
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("{op}: {source}")]
    BackingStore {
        op: &'static str,
        #[source]
        source: RepoError,
    },
}

impl CoreError {
    /// Maps a storer failure raised while running `op`.
    pub(crate) fn from_repo(op: &'static str, err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity, .. } => Self::NotFound { entity },
            RepoError::DuplicateKey { detail } => Self::NonUniqueKey { key: detail },
            RepoError::InvalidTransactionHandle => Self::InvalidTransactionHandle,
            RepoError::Validation(message) => Self::Validation(message),
            other => Self::BackingStore { op, source: other },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Lets `CoreResult` closures run under `db::tx::execute_in_transaction`.
impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::BackingStore {
            op: "transaction",
            source: RepoError::from(value),
        }
    }
}

/// Timestamp for an update of a record last stamped at `previous`.
///
/// Always later than `previous`, even when the clock has not advanced past it.
pub(crate) fn next_update_stamp(clock: &dyn Clock, previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_millis(clock.now());
    if now > previous {
        now
    } else {
        previous + TimeDelta::milliseconds(1)
    }
}

/// Where a core sends the events it produces.
pub(crate) enum EventOutlet {
    Disabled,
    Immediate(Arc<dyn EventSink>),
    /// Held until the surrounding transaction commits.
    Deferred(Mutex<Vec<DomainEvent>>),
}

impl EventOutlet {
    pub(crate) fn deferred() -> Self {
        Self::Deferred(Mutex::new(Vec::new()))
    }

    pub(crate) fn emit(&self, event: Result<DomainEvent, serde_json::Error>) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                error!("event=event_encode module=service status=error error={err}");
                return;
            }
        };

        match self {
            Self::Disabled => {}
            Self::Immediate(sink) => sink.publish(event),
            Self::Deferred(pending) => pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(event),
        }
    }

    pub(crate) fn take(&self) -> Vec<DomainEvent> {
        match self {
            Self::Deferred(pending) => {
                std::mem::take(&mut *pending.lock().unwrap_or_else(|p| p.into_inner()))
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.emit(Ok(event));
        }
    }
}
