//! Event types and the bus contract.

use std::fmt;

use async_trait::async_trait;
use prost::Message;

/// Kind of write an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Removed,
}

impl EventKind {
    /// Name used as the Kafka message key.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "CREATED",
            EventKind::Updated => "UPDATED",
            EventKind::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single checklist write, as published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub user_id: u64,
    pub checklist_id: String,
}

impl Event {
    pub fn new(kind: EventKind, user_id: u64, checklist_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id,
            checklist_id: checklist_id.into(),
        }
    }

    /// Message key: the kind name.
    pub fn key(&self) -> Vec<u8> {
        self.kind.as_str().as_bytes().to_vec()
    }

    /// Message value: the protobuf-encoded [`ChecklistEvent`].
    pub fn encode_value(&self) -> Vec<u8> {
        ChecklistEvent {
            user_id: self.user_id,
            checklist_id: self.checklist_id.clone(),
        }
        .encode_to_vec()
    }
}

/// Wire payload of an event.
#[derive(Clone, PartialEq, Message)]
pub struct ChecklistEvent {
    #[prost(uint64, tag = "1")]
    pub user_id: u64,
    #[prost(string, tag = "2")]
    pub checklist_id: String,
}

/// Errors raised by event buses.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Could not reach the broker or discover the topic.
    #[error("event bus connection failed: {message}")]
    Connection { message: String },

    /// The broker rejected or never acknowledged a produce request.
    #[error("failed to publish {count} events: {message}")]
    Publish { count: usize, message: String },

    /// The bus was closed before the call.
    #[error("event bus is closed")]
    Closed,
}

/// Destination for checklist events.
///
/// Implementations are shared between request handlers and must be
/// thread-safe. `close` is called once at shutdown.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Publishes `events`; an empty vector is a no-op.
    async fn send(&self, events: Vec<Event>) -> Result<(), EventBusError>;

    /// Releases broker resources. Later sends fail with [`EventBusError::Closed`].
    async fn close(&self) -> Result<(), EventBusError>;
}
