//! Log Writer
//!
//! Handles appending records to the log file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::SyncStrategy;
use crate::error::StoreResult;
use crate::store::Operation;

use super::LogRecord;

/// Appends records to the log file
pub struct LogWriter {
    path: PathBuf,
    file: File,

    /// Length of the log up to the last complete record
    len: u64,

    /// LSN of the last record written
    current_lsn: u64,

    sync_strategy: SyncStrategy,
    unsynced: usize,

    #[cfg(test)]
    fail_next_sync: bool,
}

impl LogWriter {
    /// Open or create a log file, continuing after `last_lsn`
    pub fn open(path: &Path, sync_strategy: SyncStrategy, last_lsn: u64) -> StoreResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append one record holding `operations`; returns its LSN
    ///
    /// A record whose write or sync fails is cut back off the file, so it is
    /// never replayed and the next append starts on a frame boundary.
    pub fn append(&mut self, operations: Vec<Operation>) -> StoreResult<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = LogRecord::new(lsn, operations).serialize()?;

        if let Err(e) = self.file.write_all(&bytes) {
            self.truncate_to(self.len);
            return Err(e.into());
        }
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNRecords { count } => self.unsynced >= count,
        };
        if due {
            if let Err(e) = self.sync() {
                self.unsynced -= 1;
                self.truncate_to(self.len);
                return Err(e);
            }
        }

        self.len += bytes.len() as u64;
        self.current_lsn = lsn;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StoreResult<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "sync failed").into());
        }
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Cut the file back to `len` after a failed append
    fn truncate_to(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            warn!(len, error = %e, "failed to truncate log after failed append");
        }
    }

    /// Replace the whole log with a single record
    ///
    /// Written to a sibling file first and renamed over the log, so a crash
    /// leaves either the old log or the new one.
    pub fn rewrite(&mut self, operations: Vec<Operation>) -> StoreResult<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = LogRecord::new(lsn, operations).serialize()?;

        let temp_path = self.path.with_extension("compact");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&bytes)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = bytes.len() as u64;
        self.current_lsn = lsn;
        self.unsynced = 0;
        Ok(lsn)
    }

    /// Get the LSN of the last record written
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Get the log length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
