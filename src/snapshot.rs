//! Immutable state values published by the stores.
//!
//! A snapshot is replaced wholesale after every reducer step; readers hold
//! clones and never observe a half-applied change. Derived views are plain
//! methods recomputed on read.

use crate::model::{Checklist, ChecklistItem};

/// Where a store is in its load lifecycle.
///
/// ```text
/// Uninitialized -> Loading -> Loaded
///                          -> LoadFailed
/// ```
///
/// A refresh or an active-checklist switch moves a settled store back to
/// `Loading`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPhase {
    /// No load has been requested yet.
    #[default]
    Uninitialized,
    /// A load is in flight.
    Loading,
    /// The latest load succeeded.
    Loaded,
    /// The latest load failed; see the snapshot's `error`.
    LoadFailed,
}

impl LoadPhase {
    /// Whether a load has finished, successfully or not.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Loaded | Self::LoadFailed)
    }
}

/// Snapshot of the checklist store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecklistsState {
    /// Checklists in insertion order.
    pub checklists: Vec<Checklist>,
    /// Load lifecycle phase.
    pub phase: LoadPhase,
    /// Message from the most recent failure, if any.
    pub error: Option<String>,
}

impl ChecklistsState {
    /// Whether the latest load succeeded.
    pub fn loaded(&self) -> bool {
        self.phase == LoadPhase::Loaded
    }

    /// Look up a checklist by id.
    pub fn checklist(&self, id: &str) -> Option<&Checklist> {
        self.checklists.iter().find(|c| c.id == id)
    }
}

/// Completion summary for one checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Items with `checked == true`.
    pub checked: usize,
    /// All items.
    pub total: usize,
}

/// Snapshot of the checklist item store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecklistItemsState {
    /// Items in insertion order.
    pub checklist_items: Vec<ChecklistItem>,
    /// Load lifecycle phase.
    pub phase: LoadPhase,
    /// Message from the most recent failure, if any.
    pub error: Option<String>,
    /// Checklist most recently selected with `set_active_checklist`.
    pub current_checklist_id: Option<String>,
}

impl ChecklistItemsState {
    /// Whether the latest load succeeded.
    pub fn loaded(&self) -> bool {
        self.phase == LoadPhase::Loaded
    }

    /// Items belonging to `checklist_id`, in insertion order.
    pub fn items_for<'a>(&'a self, checklist_id: &'a str) -> impl Iterator<Item = &'a ChecklistItem> {
        self.checklist_items
            .iter()
            .filter(move |item| item.checklist_id == checklist_id)
    }

    /// Items of the active checklist, or nothing when none is active.
    pub fn active_items(&self) -> Vec<&ChecklistItem> {
        match self.current_checklist_id.as_deref() {
            Some(id) => self.items_for(id).collect(),
            None => Vec::new(),
        }
    }

    /// Checked and total counts for `checklist_id`.
    pub fn progress(&self, checklist_id: &str) -> Progress {
        self.items_for(checklist_id)
            .fold(Progress::default(), |mut acc, item| {
                acc.total += 1;
                if item.checked {
                    acc.checked += 1;
                }
                acc
            })
    }
}
