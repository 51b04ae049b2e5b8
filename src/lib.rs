//! Reactive state stores for checklists and their items.
//!
//! Two single-writer actors own the collections; callers send command
//! intents and observe immutable snapshots. Persistence goes through a
//! gateway: JSON key-value storage ([`LocalGateway`]) or an HTTP backend
//! ([`ApiClient`]). Removing a checklist cascades to its items through the
//! [`DomainEvents`] bus.

mod actor;
mod checklist_store;
pub use checklist_store::ChecklistStore;
mod client;
mod command;
mod config;
mod dto;
mod error;
mod event;
mod gateway;
mod item_store;
pub use item_store::ChecklistItemStore;
mod model;
mod snapshot;
mod storage;
mod store;

pub use client::ApiClient;
pub use command::{ChecklistCommand, ChecklistItemCommand};
pub use config::{ApiConfig, StoreConfig};
pub use dto::{checklist_from_dto, item_from_dto, map_dto_array};
pub use error::{GatewayError, MappingError, StoreError};
pub use event::{DomainEvent, DomainEvents};
pub use gateway::{ChecklistGateway, ChecklistItemGateway, Dispatch, GatewayFuture, ItemScope};
pub use model::{Checklist, ChecklistItem, slugify, unique_slug};
pub use snapshot::{ChecklistItemsState, ChecklistsState, LoadPhase, Progress};
pub use storage::{
    CHECKLIST_ITEMS_KEY, CHECKLISTS_KEY, FileStorage, KeyValueStorage, LocalGateway, MemoryStorage,
};
pub use store::{Quicklists, QuicklistsBuilder};
