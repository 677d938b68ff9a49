//! Store Module
//!
//! The backing store contract and its implementations.
//!
//! ## Contract
//! Keys are topic strings, values are scalars. `transaction` runs a closure
//! against a handle offering the same contract; its effects become visible
//! only if the closure returns `Ok`, otherwise the store is left as it was.
//!
//! ## Implementations
//! - `MemStore`: `BTreeMap` behind a `RwLock`
//! - `LogStore`: in-memory map replayed from an append-only, CRC-framed log

mod log;
mod memory;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::codec::Entries;
use crate::error::{StoreError, StoreResult};
use crate::node::Scalar;

pub use self::log::{LogRecord, LogRecovery, LogStore, LogWriter, RecoveryResult, HEADER_SIZE};
pub use memory::MemStore;

/// Transactional key-value store holding flattened configuration entries
pub trait KvStore: Send + Sync {
    /// Whether a key exists
    fn has(&self, key: &str) -> StoreResult<bool>;

    /// Value of a key, `StoreError::KeyNotFound` when absent
    fn get(&self, key: &str) -> StoreResult<Scalar>;

    /// Values of the given keys; absent keys are omitted
    fn get_many(&self, keys: &[String]) -> StoreResult<Entries> {
        let mut found = Entries::new();
        for key in keys {
            match self.get(key) {
                Ok(value) => {
                    found.insert(key.clone(), value);
                }
                Err(StoreError::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Every entry in the store
    fn get_all(&self) -> StoreResult<Entries>;

    fn set(&self, key: &str, value: Scalar) -> StoreResult<()>;

    fn set_many(&self, entries: Entries) -> StoreResult<()> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Remove a key; removing an absent key is not an error
    fn delete(&self, key: &str) -> StoreResult<()>;

    fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()>;

    /// Run `f` atomically: all of its operations apply, or none do
    fn transaction(&self, f: &mut dyn FnMut(&dyn KvStore) -> StoreResult<()>) -> StoreResult<()>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn has(&self, key: &str) -> StoreResult<bool> {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> StoreResult<Scalar> {
        (**self).get(key)
    }

    fn get_many(&self, keys: &[String]) -> StoreResult<Entries> {
        (**self).get_many(keys)
    }

    fn get_all(&self) -> StoreResult<Entries> {
        (**self).get_all()
    }

    fn set(&self, key: &str, value: Scalar) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn set_many(&self, entries: Entries) -> StoreResult<()> {
        (**self).set_many(entries)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        (**self).delete_many(keys)
    }

    fn delete_all(&self) -> StoreResult<()> {
        (**self).delete_all()
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn KvStore) -> StoreResult<()>) -> StoreResult<()> {
        (**self).transaction(f)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// A single mutation, as recorded by a transaction and written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Set { key: String, value: Scalar },
    Delete { key: String },
    Clear,
}

impl Operation {
    /// Apply the operation to a map of entries
    pub fn apply(&self, entries: &mut Entries) {
        match self {
            Operation::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            Operation::Delete { key } => {
                entries.remove(key);
            }
            Operation::Clear => entries.clear(),
        }
    }
}

// =============================================================================
// Staged Transactions
// =============================================================================

/// Private copy of a store's entries that a transaction closure works on
///
/// Records every operation so the owner can replay or log them on commit.
pub(crate) struct Staged {
    data: RwLock<Entries>,
    operations: Mutex<Vec<Operation>>,
}

impl Staged {
    pub(crate) fn new(entries: Entries) -> Self {
        Self {
            data: RwLock::new(entries),
            operations: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, operation: Operation) {
        operation.apply(&mut self.data.write());
        self.operations.lock().push(operation);
    }

    /// Final entries and the operations that produced them
    pub(crate) fn into_parts(self) -> (Entries, Vec<Operation>) {
        (self.data.into_inner(), self.operations.into_inner())
    }
}

impl KvStore for Staged {
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

    fn get_all(&self) -> StoreResult<Entries> {
        Ok(self.data.read().clone())
    }

    fn set(&self, key: &str, value: Scalar) -> StoreResult<()> {
        self.record(Operation::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.record(Operation::Delete { key: key.to_string() });
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.record(Operation::Clear);
        Ok(())
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn KvStore) -> StoreResult<()>) -> StoreResult<()> {
        let nested = Staged::new(self.data.read().clone());
        f(&nested)?;
        let (entries, operations) = nested.into_parts();
        *self.data.write() = entries;
        self.operations.lock().extend(operations);
        Ok(())
    }
}
