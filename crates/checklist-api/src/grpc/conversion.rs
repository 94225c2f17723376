//! Conversions between proto messages and storage types.
//!
//! Proto checklists carry no id: it is generated for new checklists and
//! taken from the request for updates.

use checklist_storage::{new_checklist_id, Checklist, ChecklistItem, StorageError};
use tonic::Status;

use crate::proto::ova::checklist::v1 as pb;

// =============================================================================
// Proto → Storage
// =============================================================================

pub fn item_from_proto(item: pb::ChecklistItem) -> ChecklistItem {
    ChecklistItem {
        title: item.title,
        is_complete: item.is_complete,
    }
}

/// Builds a checklist with the given id.
pub fn checklist_from_proto(checklist: pb::Checklist, id: String) -> Checklist {
    Checklist {
        id,
        user_id: checklist.user_id,
        title: checklist.title,
        description: checklist.description,
        items: checklist.items.into_iter().map(item_from_proto).collect(),
    }
}

/// Builds a checklist with a freshly generated id.
pub fn new_checklist_from_proto(checklist: pb::Checklist) -> Checklist {
    checklist_from_proto(checklist, new_checklist_id())
}

// =============================================================================
// Storage → Proto
// =============================================================================

pub fn item_to_proto(item: &ChecklistItem) -> pb::ChecklistItem {
    pb::ChecklistItem {
        title: item.title.clone(),
        is_complete: item.is_complete,
    }
}

/// Drops the id; callers that need it wrap the result in a `UserChecklist`.
pub fn checklist_to_proto(checklist: &Checklist) -> pb::Checklist {
    pb::Checklist {
        user_id: checklist.user_id,
        title: checklist.title.clone(),
        description: checklist.description.clone(),
        items: checklist.items.iter().map(item_to_proto).collect(),
    }
}

pub fn user_checklists_to_proto(checklists: &[Checklist]) -> Vec<pb::UserChecklist> {
    checklists
        .iter()
        .map(|checklist| pb::UserChecklist {
            checklist_id: checklist.id.clone(),
            checklist: Some(checklist_to_proto(checklist)),
        })
        .collect()
}

// =============================================================================
// Errors
// =============================================================================

/// Converts a StorageError to a tonic Status.
///
/// Everything except a missing checklist maps to INTERNAL; details are
/// logged, not returned.
pub fn storage_error_to_status(err: StorageError, context: &str) -> Status {
    match &err {
        StorageError::ChecklistNotFound {
            user_id,
            checklist_id,
        } => Status::not_found(format!(
            "there is no checklist of user {user_id} with id {checklist_id}"
        )),
        _ => {
            tracing::error!(error = %err, "{context}");
            Status::internal(context.to_string())
        }
    }
}
