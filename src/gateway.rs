//! Persistence seams consumed by the stores.
//!
//! A gateway loads a collection once, resolves each command against the
//! backing store, and optionally accepts whole-collection saves. The two
//! built-in implementations are [`LocalGateway`](crate::LocalGateway)
//! (JSON key-value storage) and [`ApiClient`](crate::ApiClient) (HTTP).

use std::future::Future;
use std::pin::Pin;

use crate::error::GatewayError;
use crate::model::{Checklist, ChecklistItem};

/// Boxed future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// How a store runs a gateway's command operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The store awaits each operation before taking its next message, so
    /// results are applied in issue order.
    Inline,
    /// Each operation runs on its own task and its result re-enters the
    /// store's queue when it resolves. Results apply in resolve order.
    Concurrent,
}

/// Which items a single load returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScope {
    /// One load at startup returns every item of every checklist.
    All,
    /// Items are loaded per checklist when it becomes active.
    PerChecklist,
}

/// Persistence for the checklist collection.
///
/// # Contract
///
/// - [`load_checklists`](ChecklistGateway::load_checklists) is called once
///   per store lifetime, plus once per explicit refresh.
/// - [`save_checklists`](ChecklistGateway::save_checklists) is only called
///   after a load has succeeded, with the full collection.
/// - Command operations return the record as persisted; the store applies
///   that value, not its own request.
pub trait ChecklistGateway: Send + Sync + 'static {
    /// How the store should run command operations.
    fn dispatch(&self) -> Dispatch;

    /// Load the whole collection.
    fn load_checklists(&self) -> GatewayFuture<'_, Vec<Checklist>>;

    /// Persist the whole collection. Failures are logged by the caller and
    /// otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the write fails.
    fn save_checklists(&self, checklists: &[Checklist]) -> Result<(), GatewayError>;

    /// Create `checklist`. Its `id` was minted by the store; a backend that
    /// assigns its own ids may ignore it.
    fn create_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist>;

    /// Persist a new title for an existing checklist.
    fn update_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist>;

    /// Delete the checklist with `id`.
    fn delete_checklist(&self, id: String) -> GatewayFuture<'_, ()>;
}

/// Persistence for the checklist item collection.
///
/// Same contract as [`ChecklistGateway`], with loads optionally scoped to a
/// single checklist.
pub trait ChecklistItemGateway: Send + Sync + 'static {
    /// How the store should run command operations.
    fn dispatch(&self) -> Dispatch;

    /// Whether loads return every item or one checklist's items.
    fn scope(&self) -> ItemScope;

    /// Load items. `checklist_id` is `Some` exactly when the scope is
    /// [`ItemScope::PerChecklist`].
    fn load_items(&self, checklist_id: Option<String>) -> GatewayFuture<'_, Vec<ChecklistItem>>;

    /// Persist the whole collection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the write fails.
    fn save_items(&self, items: &[ChecklistItem]) -> Result<(), GatewayError>;

    /// Create `item`. Its `id` was minted by the store and may be replaced.
    fn create_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem>;

    /// Persist a new title for an existing item.
    fn update_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem>;

    /// Flip completion. `item` already carries the flipped value.
    fn toggle_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem>;

    /// Delete the item with `id`.
    fn delete_item(&self, id: String) -> GatewayFuture<'_, ()>;

    /// Clear `checked` on every item of `checklist_id`.
    fn reset_items(&self, checklist_id: String) -> GatewayFuture<'_, ()>;
}
