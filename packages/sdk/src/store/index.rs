use std::collections::BTreeMap;
use std::path::Path;

use common::ContentHash;
use common::storage::filesystem::write_atomic;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::StoredObject;
use crate::error::Result;
use crate::ownership::Scope;

const INDEX_VERSION: u32 = 1;

/// On-disk shape of the index.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    objects: Vec<StoredObject>,
}

/// `(scope, name) -> object` map of everything a store holds.
#[derive(Debug, Default, Clone)]
pub struct ObjectIndex {
    objects: BTreeMap<(Scope, String), StoredObject>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index file; a missing file is an empty index.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let file: IndexFile = serde_json::from_slice(&bytes)?;
        let mut index = Self::new();
        for object in file.objects {
            index.insert(object);
        }
        Ok(index)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            version: INDEX_VERSION,
            objects: self.objects.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &bytes).await?;
        Ok(())
    }

    /// Insert or replace; returns the replaced entry.
    pub fn insert(&mut self, object: StoredObject) -> Option<StoredObject> {
        self.objects
            .insert((object.scope.clone(), object.name.clone()), object)
    }

    pub fn get(&self, scope: &Scope, name: &str) -> Option<&StoredObject> {
        self.objects.get(&(scope.clone(), name.to_string()))
    }

    pub fn remove(&mut self, scope: &Scope, name: &str) -> Option<StoredObject> {
        self.objects.remove(&(scope.clone(), name.to_string()))
    }

    /// Entries of one scope in name order.
    pub fn list(&self, scope: &Scope) -> Vec<StoredObject> {
        self.objects
            .values()
            .filter(|o| &o.scope == scope)
            .cloned()
            .collect()
    }

    /// How many entries point at `hash`.
    pub fn references(&self, hash: &ContentHash) -> usize {
        self.objects
            .values()
            .filter(|o| &o.content_hash == hash)
            .count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
