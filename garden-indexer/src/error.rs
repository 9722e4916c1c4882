//! Error types for garden-indexer

use garden_store::{Address, EntityKind, EventPosition, SourceKind, StoreError};
use thiserror::Error;

use crate::accessor::AccessorError;
use crate::event::EventKind;

/// Outcome of a handler that did not complete.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A required entity does not exist; the event is skipped
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Contract call failed: {0}")]
    Accessor(#[from] AccessorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The router delivered an event this handler does not declare
    #[error("Handler cannot process {0}")]
    Unexpected(EventKind),
}

impl HandlerError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        HandlerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Fatal errors halt the chain; everything else skips the event.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HandlerError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("No handler registered for {0}")]
    MissingHandler(EventKind),

    #[error("More than one handler registered for {0}")]
    DuplicateHandler(EventKind),

    #[error("{kind} cannot be emitted by {source_kind} source {address}")]
    Unroutable {
        kind: EventKind,
        source_kind: SourceKind,
        address: Address,
    },

    #[error("{kind} at {chain_id}:{position} failed: {error}")]
    Handler {
        chain_id: u64,
        kind: EventKind,
        position: EventPosition,
        #[source]
        error: HandlerError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
