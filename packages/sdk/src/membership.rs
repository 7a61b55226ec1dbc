//! Which store each file belongs to.
//!
//! Two maps, file -> store and store -> files, kept under one lock. Every
//! mutation updates both before the lock is released, so a reader never sees a
//! file in two stores or, mid-move, in none.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::ids::{FileId, StoreId};

#[derive(Debug, Default)]
struct MembershipState {
    file_store: HashMap<FileId, StoreId>,
    store_files: HashMap<StoreId, HashSet<FileId>>,
}

impl MembershipState {
    fn detach(&mut self, file: FileId) -> Option<StoreId> {
        let previous = self.file_store.remove(&file)?;
        if let Some(files) = self.store_files.get_mut(&previous) {
            files.remove(&file);
            if files.is_empty() {
                self.store_files.remove(&previous);
            }
        }
        Some(previous)
    }

    fn attach(&mut self, file: FileId, store: StoreId) -> Option<StoreId> {
        let previous = self.detach(file);
        self.file_store.insert(file, store);
        self.store_files.entry(store).or_default().insert(file);
        previous
    }
}

/// Shared file/store membership registry.
///
/// Stores that should be able to exchange files must share one registry.
#[derive(Debug, Default)]
pub struct Membership {
    state: Mutex<MembershipState>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MembershipState> {
        // The maps are consistent after every statement that can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `file` to `store`, detaching it from wherever it was.
    ///
    /// Returns the previous store, if any.
    pub fn attach(&self, file: FileId, store: StoreId) -> Option<StoreId> {
        let previous = self.lock().attach(file, store);
        debug!(file_id = %file, store_id = %store, previous = ?previous, "File attached");
        previous
    }

    /// Detach `file` from whichever store holds it.
    pub fn detach(&self, file: FileId) -> Option<StoreId> {
        let previous = self.lock().detach(file);
        if let Some(store) = previous {
            debug!(file_id = %file, store_id = %store, "File detached");
        }
        previous
    }

    /// Detach `file` only if it currently belongs to `store`.
    pub fn detach_from(&self, file: FileId, store: StoreId) -> bool {
        let mut state = self.lock();
        if state.file_store.get(&file) != Some(&store) {
            return false;
        }
        state.detach(file);
        drop(state);
        debug!(file_id = %file, store_id = %store, "File detached");
        true
    }

    pub fn store_of(&self, file: FileId) -> Option<StoreId> {
        self.lock().file_store.get(&file).copied()
    }

    pub fn contains(&self, store: StoreId, file: FileId) -> bool {
        self.lock().file_store.get(&file) == Some(&store)
    }

    /// Files attached to `store`, in id order.
    pub fn files_in(&self, store: StoreId) -> Vec<FileId> {
        let mut files: Vec<FileId> = self
            .lock()
            .store_files
            .get(&store)
            .map(|f| f.iter().copied().collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    /// Consistent view of several stores taken under a single lock.
    pub fn snapshot(&self, stores: &[StoreId]) -> BTreeMap<StoreId, Vec<FileId>> {
        let state = self.lock();
        stores
            .iter()
            .map(|store| {
                let mut files: Vec<FileId> = state
                    .store_files
                    .get(store)
                    .map(|f| f.iter().copied().collect())
                    .unwrap_or_default();
                files.sort();
                (*store, files)
            })
            .collect()
    }

    /// Number of attached files across all stores.
    pub fn len(&self) -> usize {
        self.lock().file_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().file_store.is_empty()
    }
}
