//! In-memory repository implementation.
//!
//! Checklists are grouped per user in insertion order, which stands in for
//! the `created_at` ordering of the database backend. Used by tests and by
//! the `memory` backend for local runs.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::model::Checklist;
use crate::traits::{ChecklistRepository, NoopWriteObserver, WriteObserver};

/// In-memory implementation of [`ChecklistRepository`].
#[derive(Debug)]
pub struct MemoryChecklistRepository<O: WriteObserver = NoopWriteObserver> {
    checklists: DashMap<u64, Vec<Checklist>>,
    observer: O,
}

impl MemoryChecklistRepository {
    /// Creates an empty repository without an observer.
    pub fn new() -> Self {
        Self::with_observer(NoopWriteObserver)
    }

    /// Creates an empty repository wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for MemoryChecklistRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WriteObserver> MemoryChecklistRepository<O> {
    /// Creates an empty repository that notifies `observer` after writes.
    pub fn with_observer(observer: O) -> Self {
        Self {
            checklists: DashMap::new(),
            observer,
        }
    }

    /// Total number of stored checklists across all users.
    pub fn len(&self) -> usize {
        self.checklists.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }
}

fn ensure_active(cancel: &CancellationToken, operation: &str) -> StorageResult<()> {
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled {
            operation: operation.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl<O: WriteObserver> ChecklistRepository for MemoryChecklistRepository<O> {
    #[instrument(skip(self, cancel, checklists), fields(count = checklists.len()))]
    async fn add(
        &self,
        cancel: &CancellationToken,
        checklists: &[Checklist],
    ) -> StorageResult<()> {
        if checklists.is_empty() {
            return Ok(());
        }
        ensure_active(cancel, "add")?;

        // All-or-nothing, like a single multi-row INSERT.
        for (index, checklist) in checklists.iter().enumerate() {
            let in_batch = checklists[..index]
                .iter()
                .any(|c| c.user_id == checklist.user_id && c.id == checklist.id);
            let stored = self
                .checklists
                .get(&checklist.user_id)
                .is_some_and(|user| user.iter().any(|c| c.id == checklist.id));
            if in_batch || stored {
                return Err(StorageError::QueryError {
                    message: format!(
                        "duplicate checklist {} for user {}",
                        checklist.id, checklist.user_id
                    ),
                });
            }
        }

        for checklist in checklists {
            self.checklists
                .entry(checklist.user_id)
                .or_default()
                .push(checklist.clone());
        }

        self.observer.on_add_success(checklists).await;
        Ok(())
    }

    async fn list(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        limit: u64,
        offset: u64,
    ) -> StorageResult<Vec<Checklist>> {
        ensure_active(cancel, "list")?;

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .checklists
            .get(&user_id)
            .map(|user| user.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn describe(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<Checklist> {
        ensure_active(cancel, "describe")?;

        self.checklists
            .get(&user_id)
            .and_then(|user| user.iter().find(|c| c.id == checklist_id).cloned())
            .ok_or_else(|| StorageError::ChecklistNotFound {
                user_id,
                checklist_id: checklist_id.to_string(),
            })
    }

    #[instrument(skip(self, cancel))]
    async fn remove(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<()> {
        ensure_active(cancel, "remove")?;

        if let Some(mut user) = self.checklists.get_mut(&user_id) {
            user.retain(|c| c.id != checklist_id);
        }

        self.observer.on_remove_success(user_id, checklist_id).await;
        Ok(())
    }

    #[instrument(skip(self, cancel, checklist), fields(user_id = checklist.user_id, checklist_id = %checklist.id))]
    async fn update(
        &self,
        cancel: &CancellationToken,
        checklist: &Checklist,
    ) -> StorageResult<()> {
        ensure_active(cancel, "update")?;

        if let Some(mut user) = self.checklists.get_mut(&checklist.user_id) {
            if let Some(stored) = user.iter_mut().find(|c| c.id == checklist.id) {
                *stored = checklist.clone();
            }
        }

        self.observer.on_update_success(checklist).await;
        Ok(())
    }
}
