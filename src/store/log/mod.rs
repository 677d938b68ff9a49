//! Log-backed store
//!
//! Entries live in memory; every committed write or transaction is first
//! appended to the log as one CRC-framed record. On open the log is replayed,
//! so a transaction is either fully present after a crash or not at all.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod record;
mod recovery;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::Entries;
use crate::config::LogStoreOptions;
use crate::error::{StoreError, StoreResult};
use crate::node::Scalar;

use super::{KvStore, Operation, Staged};

pub use record::{LogRecord, HEADER_SIZE};
pub use recovery::{LogRecovery, RecoveryResult};
pub use writer::LogWriter;

/// Persistent store replayed from an append-only log
///
/// ## Concurrency
/// - `writer`: Mutex, held for the whole of a write or transaction
/// - `data`: RwLock, readers never wait on the log
/// - Lock order is always writer → data
pub struct LogStore {
    path: PathBuf,
    data: RwLock<Entries>,
    writer: Mutex<LogWriter>,
    recovery: RecoveryResult,
}

impl LogStore {
    /// Open or create a log store at `path`
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(LogStoreOptions::new(path))
    }

    /// Open or create a log store with explicit options
    ///
    /// On startup:
    /// 1. Create the parent directory if needed
    /// 2. Recover records, dropping a torn tail
    /// 3. Replay every operation into memory
    pub fn open_with(options: LogStoreOptions) -> StoreResult<Self> {
        let path = options.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let (records, recovery) = LogRecovery::recover(&path)?;
        if recovery.records_recovered > 0 || recovery.records_corrupted > 0 {
            info!(
                path = %path.display(),
                recovered = recovery.records_recovered,
                corrupted = recovery.records_corrupted,
                last_lsn = recovery.last_lsn,
                "replayed log"
            );
        }

        let mut data = Entries::new();
        for record in &records {
            for operation in &record.operations {
                operation.apply(&mut data);
            }
        }

        let writer = LogWriter::open(&path, options.sync_strategy, recovery.last_lsn)?;

        Ok(Self {
            path,
            data: RwLock::new(data),
            writer: Mutex::new(writer),
            recovery,
        })
    }

    /// Append `operations` as one record, then apply them in memory
    fn commit(&self, operations: Vec<Operation>) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        let lsn = writer.append(operations.clone())?;
        debug!(lsn, operations = operations.len(), "appended log record");

        let mut data = self.data.write();
        for operation in &operations {
            operation.apply(&mut data);
        }
        Ok(())
    }

    /// Rewrite the log as a single record holding the current entries
    pub fn compact(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        let data = self.data.read();

        let mut operations = Vec::with_capacity(data.len() + 1);
        operations.push(Operation::Clear);
        operations.extend(data.iter().map(|(key, value)| Operation::Set {
            key: key.clone(),
            value: value.clone(),
        }));

        let lsn = writer.rewrite(operations)?;
        info!(path = %self.path.display(), lsn, entries = data.len(), "compacted log");
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&self) -> StoreResult<()> {
        self.writer.lock().sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stats of the recovery performed when the store was opened
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// LSN of the last record in the log
    pub fn current_lsn(&self) -> u64 {
        self.writer.lock().current_lsn()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for LogStore {
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
        self.commit(vec![Operation::Set {
            key: key.to_string(),
            value,
        }])
    }

    fn set_many(&self, entries: Entries) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.commit(
            entries
                .into_iter()
                .map(|(key, value)| Operation::Set { key, value })
                .collect(),
        )
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.commit(vec![Operation::Delete { key: key.to_string() }])
    }

    fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.commit(
            keys.iter()
                .map(|key| Operation::Delete { key: key.clone() })
                .collect(),
        )
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.commit(vec![Operation::Clear])
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn KvStore) -> StoreResult<()>) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        let staged = Staged::new(self.data.read().clone());
        f(&staged)?;

        let (entries, operations) = staged.into_parts();
        if operations.is_empty() {
            return Ok(());
        }
        let lsn = writer.append(operations)?;
        debug!(lsn, "committed transaction");

        *self.data.write() = entries;
        Ok(())
    }
}
