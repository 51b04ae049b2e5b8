//! Command intents accepted by the stores.
//!
//! An intent is a requested mutation that has not been applied yet. Stores
//! queue intents, resolve them against their gateway, and only change state
//! once the result is known.

use serde::{Deserialize, Serialize};

/// Mutations of the checklist collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChecklistCommand {
    /// Append a checklist with a freshly minted slug id.
    Add {
        /// Title to slugify; must not be blank.
        title: String,
    },
    /// Replace the title of checklist `id`.
    Edit {
        /// Checklist to rename.
        id: String,
        /// New title; must not be blank.
        title: String,
    },
    /// Remove checklist `id`, cascading to its items.
    Remove {
        /// Checklist to remove.
        id: String,
    },
}

impl ChecklistCommand {
    /// Short name used in log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Edit { .. } => "edit",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Mutations of the checklist item collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChecklistItemCommand {
    /// Append an unchecked item to `checklist_id`.
    Add {
        /// Checklist the item belongs to.
        checklist_id: String,
        /// Item title; must not be blank.
        title: String,
    },
    /// Replace the title of item `id`.
    Edit {
        /// Item to rename.
        id: String,
        /// New title; must not be blank.
        title: String,
    },
    /// Remove item `id`.
    Remove {
        /// Item to remove.
        id: String,
    },
    /// Flip `checked` on item `id`.
    Toggle {
        /// Item to flip.
        id: String,
    },
    /// Clear `checked` on every item of `checklist_id`.
    Reset {
        /// Checklist whose items are unchecked.
        checklist_id: String,
    },
}

impl ChecklistItemCommand {
    /// Short name used in log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Edit { .. } => "edit",
            Self::Remove { .. } => "remove",
            Self::Toggle { .. } => "toggle",
            Self::Reset { .. } => "reset",
        }
    }
}
