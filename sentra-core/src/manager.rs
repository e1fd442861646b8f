// sentra-core/src/manager.rs
// Process-wide registry of named collections.
//
// Explicitly constructed and passed down by the server - no hidden
// singleton. The map mutex guards only handle lookup/creation; collection
// work happens under each collection's own lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collection::Collection;
use crate::error::{Result, StoreError};
use crate::log_info;

/// Registry guaranteeing exactly one `Collection` handle per name.
pub struct CollectionManager {
    data_dir: PathBuf,
    collections: Mutex<HashMap<String, Arc<Collection>>>,
}

impl CollectionManager {
    /// Collections live under `<data_dir>/<name>/`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        CollectionManager {
            data_dir: data_dir.into(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Return the existing handle for `name`, or lazily open the collection
    /// from disk. A collection with no files yet is simply empty.
    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        if !valid_name(name) {
            return Err(StoreError::InvalidCollectionName(name.to_string()));
        }

        let mut collections = self.collections.lock();
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection = Arc::new(Collection::open(name, self.data_dir.join(name))?);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Names of all loaded collections.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget the handle and delete the backing directory. Returns whether
    /// the collection was loaded.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        let removed = self.collections.lock().remove(name);

        let dir = self.data_dir.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        if removed.is_some() {
            log_info!("dropped collection '{}'", name);
        }
        Ok(removed.is_some())
    }

    /// Persist documents and indexes of every loaded collection.
    pub fn save_all(&self) -> Result<()> {
        let handles: Vec<Arc<Collection>> =
            self.collections.lock().values().cloned().collect();
        for collection in handles {
            collection.save()?;
            collection.save_indexes()?;
        }
        Ok(())
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
