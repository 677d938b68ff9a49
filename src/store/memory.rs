//! In-memory store
//!
//! BTreeMap-based store with RwLock for concurrency.

use parking_lot::RwLock;

use crate::codec::Entries;
use crate::error::{StoreError, StoreResult};
use crate::node::Scalar;

use super::{KvStore, Staged};

/// Volatile store, mostly for tests and single-process setups
#[derive(Debug, Default)]
pub struct MemStore {
    data: RwLock<Entries>,
}

impl MemStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            data: RwLock::new(entries),
        }
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> Entries {
        self.data.read().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<Scalar> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    fn get_many(&self, keys: &[String]) -> StoreResult<Entries> {
        let data = self.data.read();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn get_all(&self) -> StoreResult<Entries> {
        Ok(self.snapshot())
    }

    fn set(&self, key: &str, value: Scalar) -> StoreResult<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn set_many(&self, entries: Entries) -> StoreResult<()> {
        self.data.write().extend(entries);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        let mut data = self.data.write();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn KvStore) -> StoreResult<()>) -> StoreResult<()> {
        // Held for the whole closure so no other writer interleaves
        let mut data = self.data.write();
        let staged = Staged::new(data.clone());
        f(&staged)?;
        let (entries, _) = staged.into_parts();
        *data = entries;
        Ok(())
    }
}
