//! Chunked persistence of buffered checklists.

use std::sync::Arc;

use async_trait::async_trait;
use checklist_storage::{Checklist, ChecklistRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::chunker::split;

/// Persists a batch and hands back whatever could not be persisted.
#[async_trait]
pub trait Flusher: Send + Sync + 'static {
    /// Returns the checklists that failed to persist, in their original order.
    async fn flush(&self, cancel: &CancellationToken, batch: Vec<Checklist>) -> Vec<Checklist>;
}

/// Writes a batch to the repository in chunks of at most `chunk_size`.
///
/// A failing chunk is logged and returned to the caller; later chunks are
/// still attempted.
pub struct ChunkedFlusher<R: ChecklistRepository> {
    repository: Arc<R>,
    chunk_size: usize,
}

impl<R: ChecklistRepository> ChunkedFlusher<R> {
    /// A zero `chunk_size` is raised to one so that no item is silently skipped.
    pub fn new(repository: Arc<R>, chunk_size: usize) -> Self {
        Self {
            repository,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[async_trait]
impl<R: ChecklistRepository> Flusher for ChunkedFlusher<R> {
    async fn flush(&self, cancel: &CancellationToken, batch: Vec<Checklist>) -> Vec<Checklist> {
        let mut unflushed = Vec::new();

        for chunk in split(&batch, self.chunk_size) {
            match self.repository.add(cancel, chunk).await {
                Ok(()) => debug!(count = chunk.len(), "Flushed chunk"),
                Err(err) => {
                    warn!(
                        error = %err,
                        count = chunk.len(),
                        "Unable to flush chunk, keeping it for the next flush"
                    );
                    metrics::counter!("ova_checklist_saver_unflushed_items_total")
                        .increment(chunk.len() as u64);
                    unflushed.extend_from_slice(chunk);
                }
            }
        }

        unflushed
    }
}
