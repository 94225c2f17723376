//! checklist-storage: Checklist model and persistence layer
//!
//! This crate provides:
//! - The `Checklist` model and its stored JSON body
//! - `ChecklistRepository` and `WriteObserver` contracts
//! - In-memory implementation for tests and local runs
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             checklist-storage               │
//! ├─────────────────────────────────────────────┤
//! │  model.rs    - Checklist, ChecklistItem     │
//! │  traits.rs   - Repository / observer traits │
//! │  memory.rs   - In-memory implementation     │
//! │  postgres.rs - PostgreSQL implementation    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryChecklistRepository;
pub use model::{new_checklist_id, Checklist, ChecklistItem};
pub use postgres::{PostgresChecklistRepository, PostgresConfig, MAX_INSERT_ROWS};
pub use traits::{ChecklistRepository, NoopWriteObserver, WriteObserver};
