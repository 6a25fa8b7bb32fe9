//! Domain events and the publish/subscribe registry.
//!
//! # Responsibility
//! - Define the immutable `DomainEvent` record produced by entity cores.
//! - Dispatch published events to handlers registered per `(source, kind)`.
//!
//! # Invariants
//! - Events describe committed state; cores publish only after a successful
//!   persist (or after commit, for transactional writes).
//! - A failing handler never fails the publishing write path.

use log::{debug, error};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Immutable fact describing a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub source: String,
    pub kind: String,
    /// JSON-encoded event parameters.
    pub raw_params: Vec<u8>,
}

impl DomainEvent {
    /// Builds an event by JSON-encoding `params`.
    pub fn new<P: Serialize>(
        source: impl Into<String>,
        kind: impl Into<String>,
        params: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            source: source.into(),
            kind: kind.into(),
            raw_params: serde_json::to_vec(params)?,
        })
    }

    /// Decodes `raw_params` as a generic JSON value.
    pub fn params_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.raw_params)
    }
}

/// Append-style notification channel for domain events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

#[derive(Debug, Error)]
#[error("event handler failed: {0}")]
pub struct EventHandlerError(pub String);

type Handler = Box<dyn Fn(&DomainEvent) -> Result<(), EventHandlerError> + Send + Sync>;

/// Handler registry that dispatches synchronously on `publish`.
#[derive(Default)]
pub struct EventCore {
    handlers: RwLock<HashMap<(String, String), Vec<Handler>>>,
}

impl EventCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events with the given source and kind.
    pub fn add_handler<F>(&self, source: &str, kind: &str, handler: F)
    where
        F: Fn(&DomainEvent) -> Result<(), EventHandlerError> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        handlers
            .entry((source.to_string(), kind.to_string()))
            .or_default()
            .push(Box::new(handler));
    }

    pub fn handler_count(&self, source: &str, kind: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        handlers
            .get(&(source.to_string(), kind.to_string()))
            .map_or(0, Vec::len)
    }
}

impl EventSink for EventCore {
    fn publish(&self, event: DomainEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        let Some(registered) = handlers.get(&(event.source.clone(), event.kind.clone())) else {
            debug!(
                "event=event_publish module=event status=ok source={} kind={} handlers=0",
                event.source, event.kind
            );
            return;
        };

        for handler in registered {
            if let Err(err) = handler(&event) {
                error!(
                    "event=event_publish module=event status=error source={} kind={} error={}",
                    event.source, event.kind, err
                );
            }
        }
        debug!(
            "event=event_publish module=event status=ok source={} kind={} handlers={}",
            event.source,
            event.kind,
            registered.len()
        );
    }
}
