//! Local key-value persistence and the gateway built on top of it.
//!
//! Each collection lives under one key as a JSON array:
//!
//! ```text
//! checklists      -> [{"id": "...", "title": "..."}, ...]
//! checklistItems  -> [{"id": "...", "checklistId": "...", "title": "...", "checked": false}, ...]
//! ```
//!
//! A missing key reads as an empty collection.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::dto::{checklist_from_dto, item_from_dto, map_dto_array};
use crate::error::{GatewayError, MappingError};
use crate::gateway::{ChecklistGateway, ChecklistItemGateway, Dispatch, GatewayFuture, ItemScope};
use crate::model::{Checklist, ChecklistItem};

/// Storage key holding the checklist collection.
pub const CHECKLISTS_KEY: &str = "checklists";

/// Storage key holding the checklist item collection.
pub const CHECKLIST_ITEMS_KEY: &str = "checklistItems";

/// Synchronous string key-value storage.
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Read the value under `key`, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the backing medium cannot be read.
    fn get_item(&self, key: &str) -> io::Result<Option<String>>;

    /// Replace the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the backing medium cannot be written.
    fn set_item(&self, key: &str, value: &str) -> io::Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to `<key>.json.tmp` first and are renamed into place, so a
/// reader never sees a partially written file. The directory is created
/// lazily on the first write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file that holds `key`.
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.key_path(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Gateway over [`KeyValueStorage`].
///
/// Commands resolve immediately by echoing the record the store minted;
/// the store then saves the whole collection. Runs with
/// [`Dispatch::Inline`] and loads every item at once.
#[derive(Debug)]
pub struct LocalGateway<S> {
    storage: Arc<S>,
}

impl<S> Clone for LocalGateway<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: KeyValueStorage> LocalGateway<S> {
    /// Wrap `storage`.
    pub fn new(storage: S) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn load_collection<T>(
        &self,
        key: &str,
        mapper: impl Fn(&Value) -> Result<T, MappingError>,
    ) -> Result<Vec<T>, GatewayError> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(Vec::new());
        };
        let value: Value = serde_json::from_str(&raw).map_err(|source| GatewayError::Decode {
            key: key.to_owned(),
            source,
        })?;
        Ok(map_dto_array(&value, mapper)?)
    }

    fn save_collection<T: Serialize>(&self, key: &str, records: &[T]) -> Result<(), GatewayError> {
        let json = serde_json::to_string(records).map_err(|source| GatewayError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.storage.set_item(key, &json)?;
        Ok(())
    }
}

impl<S: KeyValueStorage> ChecklistGateway for LocalGateway<S> {
    fn dispatch(&self) -> Dispatch {
        Dispatch::Inline
    }

    fn load_checklists(&self) -> GatewayFuture<'_, Vec<Checklist>> {
        Box::pin(async move { self.load_collection(CHECKLISTS_KEY, checklist_from_dto) })
    }

    fn save_checklists(&self, checklists: &[Checklist]) -> Result<(), GatewayError> {
        self.save_collection(CHECKLISTS_KEY, checklists)
    }

    fn create_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        Box::pin(async move { Ok(checklist) })
    }

    fn update_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        Box::pin(async move { Ok(checklist) })
    }

    fn delete_checklist(&self, _id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}

impl<S: KeyValueStorage> ChecklistItemGateway for LocalGateway<S> {
    fn dispatch(&self) -> Dispatch {
        Dispatch::Inline
    }

    fn scope(&self) -> ItemScope {
        ItemScope::All
    }

    fn load_items(&self, _checklist_id: Option<String>) -> GatewayFuture<'_, Vec<ChecklistItem>> {
        Box::pin(async move { self.load_collection(CHECKLIST_ITEMS_KEY, item_from_dto) })
    }

    fn save_items(&self, items: &[ChecklistItem]) -> Result<(), GatewayError> {
        self.save_collection(CHECKLIST_ITEMS_KEY, items)
    }

    fn create_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        Box::pin(async move { Ok(item) })
    }

    fn update_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        Box::pin(async move { Ok(item) })
    }

    fn toggle_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        Box::pin(async move { Ok(item) })
    }

    fn delete_item(&self, _id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn reset_items(&self, _checklist_id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}
