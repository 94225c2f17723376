//! Checklist domain events.
//!
//! Successful repository writes are mirrored onto an [`EventBus`] by
//! [`EventBusWriteObserver`]. The bus is either Kafka ([`KafkaEventBus`]) or,
//! when `kafka.enabled` is false, [`DummyEventBus`].
//!
//! # Metrics
//!
//! - `ova_checklist_events_published_total{kind, outcome}` - events handed to the bus

mod bus;
mod dummy;
mod kafka;
pub mod murmur2;
mod observer;

use std::sync::Arc;

use tracing::info;

pub use bus::{ChecklistEvent, Event, EventBus, EventBusError, EventKind};
pub use dummy::DummyEventBus;
pub use kafka::{KafkaEventBus, DEFAULT_CONNECT_TIMEOUT};
pub use observer::EventBusWriteObserver;

use crate::config::KafkaSettings;

/// Builds the bus selected by `settings.enabled`.
pub async fn build_event_bus(settings: &KafkaSettings) -> Result<Arc<dyn EventBus>, EventBusError> {
    if !settings.enabled {
        info!("Kafka disabled, events will be discarded");
        return Ok(Arc::new(DummyEventBus));
    }

    let bus = KafkaEventBus::connect(settings).await?;
    Ok(Arc::new(bus))
}
