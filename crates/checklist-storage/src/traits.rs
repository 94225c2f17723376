//! Repository and write-observer contracts.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StorageResult;
use crate::model::Checklist;

/// Persistent, user-scoped checklist storage.
///
/// Implementations must be thread-safe (Send + Sync). Every operation takes a
/// cancellation token; a cancelled token aborts the operation with
/// `StorageError::Cancelled`. Write operations notify the repository's
/// [`WriteObserver`] only after the backend reports success.
#[async_trait]
pub trait ChecklistRepository: Send + Sync + 'static {
    /// Inserts all checklists in one statement. An empty slice is a no-op.
    async fn add(&self, cancel: &CancellationToken, checklists: &[Checklist])
        -> StorageResult<()>;

    /// Lists checklists of `user_id` ordered by creation time.
    async fn list(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        limit: u64,
        offset: u64,
    ) -> StorageResult<Vec<Checklist>>;

    /// Fetches one checklist, `StorageError::ChecklistNotFound` if absent.
    async fn describe(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<Checklist>;

    /// Deletes one checklist. Deleting a missing row is not an error.
    async fn remove(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<()>;

    /// Replaces the stored body of `(checklist.user_id, checklist.id)`.
    async fn update(&self, cancel: &CancellationToken, checklist: &Checklist)
        -> StorageResult<()>;
}

/// Capability notified after successful repository writes.
///
/// Observers never fail the write they observe; they report their own
/// failures through logging.
#[async_trait]
pub trait WriteObserver: Send + Sync + 'static {
    async fn on_add_success(&self, checklists: &[Checklist]);

    async fn on_remove_success(&self, user_id: u64, checklist_id: &str);

    async fn on_update_success(&self, checklist: &Checklist);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWriteObserver;

#[async_trait]
impl WriteObserver for NoopWriteObserver {
    async fn on_add_success(&self, _checklists: &[Checklist]) {}

    async fn on_remove_success(&self, _user_id: u64, _checklist_id: &str) {}

    async fn on_update_success(&self, _checklist: &Checklist) {}
}
