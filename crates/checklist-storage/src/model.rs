//! Checklist data model.
//!
//! The serialized form of a [`Checklist`] is the JSON body stored in the
//! `data` column:
//!
//! ```json
//! {"id":"…","user_id":7,"title":"…","description":"…","items":[{"title":"…","is_complete":false}]}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// A single titled entry of a checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub title: String,
    pub is_complete: bool,
}

impl ChecklistItem {
    pub fn new(title: impl Into<String>, is_complete: bool) -> Self {
        Self {
            title: title.into(),
            is_complete,
        }
    }

    fn status(&self) -> &'static str {
        if self.is_complete {
            "Complete"
        } else {
            "Incomplete"
        }
    }
}

impl fmt::Display for ChecklistItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.status())
    }
}

/// A user-owned checklist.
///
/// `(user_id, id)` identifies a checklist. Item order is part of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: String,
    pub user_id: u64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

impl Checklist {
    /// Creates a checklist with a freshly generated id.
    pub fn new(
        user_id: u64,
        title: impl Into<String>,
        description: impl Into<String>,
        items: Vec<ChecklistItem>,
    ) -> Self {
        Self {
            id: new_checklist_id(),
            user_id,
            title: title.into(),
            description: description.into(),
            items,
        }
    }

    /// Returns true when the checklist has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true when every item is complete. An empty checklist is complete.
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.is_complete)
    }

    /// Serializes the checklist into the stored JSON body.
    pub fn to_json(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored JSON body.
    pub fn from_json(serialized: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(serialized)?)
    }
}

impl fmt::Display for Checklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Generates a new random (v4) checklist id.
pub fn new_checklist_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
