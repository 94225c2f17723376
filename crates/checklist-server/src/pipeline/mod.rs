//! Write-buffering batch pipeline.
//!
//! Checklists submitted through `MultiCreateChecklist` do not hit the
//! database one by one. They are queued in a [`Saver`], coalesced by its
//! dispatcher and written by a [`Flusher`] in chunks produced by
//! [`chunker::split`]:
//!
//! ```text
//! try_save ─▶ bounded queue ─▶ dispatcher buffer ─▶ Flusher ─▶ Repository::add (per chunk)
//!                                     ▲                 │
//!                                     └── failed chunks ┘
//! ```
//!
//! # Metrics
//!
//! - `ova_checklist_saver_flushes_total{trigger}` - flushes by trigger (capacity, timer, shutdown)
//! - `ova_checklist_saver_unflushed_items_total` - items returned by failed chunks
//! - `ova_checklist_saver_dropped_items_total` - items still unflushed when the saver closed
//! - `ova_checklist_saver_buffered_items` - current dispatcher buffer length

pub mod chunker;
mod flusher;
mod saver;

pub use chunker::split;
pub use flusher::{ChunkedFlusher, Flusher};
pub use saver::Saver;
