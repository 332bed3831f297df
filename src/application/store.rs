use crate::domain::catalog::CatalogEntry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The shared catalog of registered items.
///
/// Every read and write goes through one `RwLock`, so a reader never sees a
/// half-applied reconciliation pass. Entries keep their registration order and
/// are never removed.
#[derive(Debug, Default)]
pub struct CatalogStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub(crate) entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl StoreInner {
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut CatalogEntry> {
        let position = *self.index.get(id)?;
        self.entries.get_mut(position)
    }

    fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index.get(id).and_then(|&position| self.entries.get(position))
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let store = Self::new();
        for entry in entries {
            store.register(entry);
        }
        store
    }

    /// Adds an entry. Returns `false` and leaves the store untouched if the id
    /// is already registered.
    pub fn register(&self, entry: CatalogEntry) -> bool {
        let mut inner = self.write();
        if inner.index.contains_key(entry.id()) {
            return false;
        }
        let position = inner.entries.len();
        inner.index.insert(entry.id().to_string(), position);
        inner.entries.push(entry);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<CatalogEntry> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in registration order.
    pub fn snapshot(&self) -> Vec<CatalogEntry> {
        self.read().entries.clone()
    }

    /// The first requested id that is not registered.
    pub fn first_unknown<'a>(&self, ids: &'a [String]) -> Option<&'a str> {
        let inner = self.read();
        ids.iter()
            .find(|id| !inner.index.contains_key(id.as_str()))
            .map(String::as_str)
    }

    pub fn all_loaded(&self, ids: &[String]) -> bool {
        let inner = self.read();
        ids.iter()
            .all(|id| inner.get(id).is_some_and(CatalogEntry::is_loaded))
    }

    /// Loaded entries for `ids`, in request order. Unloaded or unknown ids are skipped.
    pub fn loaded_subset(&self, ids: &[String]) -> Vec<CatalogEntry> {
        let inner = self.read();
        ids.iter()
            .filter_map(|id| inner.get(id))
            .filter(|entry| entry.is_loaded())
            .cloned()
            .collect()
    }

    /// First entry in registration order matching `predicate`.
    pub fn find_first<F>(&self, predicate: F) -> Option<CatalogEntry>
    where
        F: Fn(&CatalogEntry) -> bool,
    {
        self.read().entries.iter().find(|&entry| predicate(entry)).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
