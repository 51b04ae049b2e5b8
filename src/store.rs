//! Composition root: both stores wired to one backend and one event bus.
//!
//! The session is opened via [`QuicklistsBuilder`], which picks the backend
//! (in-memory, file-backed, or HTTP), spawns the item store first so it is
//! subscribed before the checklist store can publish, then spawns the
//! checklist store.

use std::path::PathBuf;

use crate::checklist_store::ChecklistStore;
use crate::client::ApiClient;
use crate::config::{ApiConfig, StoreConfig};
use crate::error::{GatewayError, StoreError};
use crate::event::DomainEvents;
use crate::gateway::{ChecklistGateway, ChecklistItemGateway};
use crate::item_store::ChecklistItemStore;
use crate::storage::{FileStorage, LocalGateway, MemoryStorage};

/// A running Quicklists session.
///
/// `Clone` is cheap; clones share the same actors.
#[derive(Debug, Clone)]
pub struct Quicklists {
    checklists: ChecklistStore,
    items: ChecklistItemStore,
    events: DomainEvents,
}

impl Quicklists {
    /// Start configuring a session.
    pub fn builder() -> QuicklistsBuilder {
        QuicklistsBuilder::new()
    }

    /// Spawn both stores over caller-supplied gateways.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_gateways<C, I>(checklists: C, items: I, config: &StoreConfig) -> Self
    where
        C: ChecklistGateway,
        I: ChecklistItemGateway,
    {
        let events = DomainEvents::new();
        let items = ChecklistItemStore::spawn(items, &events, config);
        let checklists = ChecklistStore::spawn(checklists, events.clone(), config);
        Self {
            checklists,
            items,
            events,
        }
    }

    /// The checklist store.
    pub fn checklists(&self) -> &ChecklistStore {
        &self.checklists
    }

    /// The checklist item store.
    pub fn items(&self) -> &ChecklistItemStore {
        &self.items
    }

    /// The bus carrying cross-store events.
    pub fn events(&self) -> &DomainEvents {
        &self.events
    }

    /// Stop both actors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if either store had already stopped.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.checklists.shutdown().await?;
        self.items.shutdown().await
    }
}

#[derive(Debug, Clone)]
enum Backend {
    Memory(MemoryStorage),
    Files(PathBuf),
    Remote(ApiConfig),
}

/// Builder for configuring and opening a [`Quicklists`] session.
///
/// Defaults to a fresh in-memory backend.
///
/// # Examples
///
/// ```
/// use quicklists::Quicklists;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), quicklists::GatewayError> {
/// let dir = std::env::temp_dir().join("quicklists-doc");
/// let session = Quicklists::builder().file_storage(&dir).open()?;
/// session.checklists().add("Groceries").await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QuicklistsBuilder {
    backend: Backend,
    config: StoreConfig,
}

impl QuicklistsBuilder {
    /// Create a builder with an in-memory backend and default tunables.
    pub fn new() -> Self {
        Self {
            backend: Backend::Memory(MemoryStorage::new()),
            config: StoreConfig::default(),
        }
    }

    /// Use a fresh in-memory backend.
    pub fn memory(self) -> Self {
        self.memory_storage(MemoryStorage::new())
    }

    /// Use `storage` as the backend. Clones of it observe every save.
    pub fn memory_storage(mut self, storage: MemoryStorage) -> Self {
        self.backend = Backend::Memory(storage);
        self
    }

    /// Persist both collections as JSON files under `dir`.
    pub fn file_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backend = Backend::Files(dir.into());
        self
    }

    /// Talk to the HTTP backend described by `config`.
    pub fn remote(mut self, config: ApiConfig) -> Self {
        self.backend = Backend::Remote(config);
        self
    }

    /// Override store tunables.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the stores. Both start loading immediately (item loads over
    /// HTTP wait for an active checklist).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidBaseUrl`] or [`GatewayError::Http`] if
    /// the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn open(self) -> Result<Quicklists, GatewayError> {
        let session = match self.backend {
            Backend::Memory(storage) => {
                tracing::info!("opening quicklists with in-memory storage");
                let gateway = LocalGateway::new(storage);
                Quicklists::with_gateways(gateway.clone(), gateway, &self.config)
            }
            Backend::Files(dir) => {
                tracing::info!(dir = %dir.display(), "opening quicklists with file storage");
                let gateway = LocalGateway::new(FileStorage::new(dir));
                Quicklists::with_gateways(gateway.clone(), gateway, &self.config)
            }
            Backend::Remote(api) => {
                tracing::info!(base_url = %api.base_url, "opening quicklists over HTTP");
                let client = ApiClient::new(&api)?;
                Quicklists::with_gateways(client.clone(), client, &self.config)
            }
        };
        Ok(session)
    }
}

impl Default for QuicklistsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
