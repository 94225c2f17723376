//! checklist-server: configuration, batch save pipeline and event adapter
//!
//! This crate contains the layer between the gRPC surface and storage:
//! - Configuration management
//! - The write-buffering batch pipeline used by `MultiCreateChecklist`
//! - Domain events published after successful writes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              checklist-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  pipeline/   - Batch save pipeline          │
//! │    chunker.rs - Order-preserving chunking   │
//! │    flusher.rs - Chunked repository writes   │
//! │    saver.rs   - Bounded buffer, dispatcher  │
//! │  events/     - Event adapter                │
//! │    bus.rs      - Event types, bus trait     │
//! │    kafka.rs    - Kafka bus                  │
//! │    observer.rs - Write observer             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod events;
pub mod pipeline;

// Re-exports for convenience
pub use config::{AppConfig, ConfigLoadError};
pub use events::{build_event_bus, EventBus, EventBusError, EventBusWriteObserver};
pub use pipeline::{ChunkedFlusher, Flusher, Saver};
