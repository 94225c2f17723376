//! Event bus that discards everything, used when Kafka is disabled.

use async_trait::async_trait;
use tracing::trace;

use super::bus::{Event, EventBus, EventBusError};

/// Bus used when Kafka is disabled: accepts every event and discards it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyEventBus;

#[async_trait]
impl EventBus for DummyEventBus {
    async fn send(&self, events: Vec<Event>) -> Result<(), EventBusError> {
        trace!(count = events.len(), "Discarding events");
        Ok(())
    }

    async fn close(&self) -> Result<(), EventBusError> {
        Ok(())
    }
}
