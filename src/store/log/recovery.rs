//! Log Recovery
//!
//! Rebuilds the committed record sequence after a restart or crash.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::error::StoreResult;

use super::record::Decoded;
use super::LogRecord;

/// Handles log recovery after a crash
pub struct LogRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub records_recovered: u64,

    /// Number of corrupted records skipped
    pub records_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the log was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl LogRecovery {
    /// Recover records from a log file
    ///
    /// This will:
    /// 1. Read all valid records
    /// 2. Detect and skip corrupted records
    /// 3. Truncate partial writes at end
    /// 4. Return all valid records in order
    pub fn recover(path: &Path) -> StoreResult<(Vec<LogRecord>, RecoveryResult)> {
        Self::scan(path, true)
    }

    /// Verify integrity of a log file without modifying it
    pub fn verify(path: &Path) -> StoreResult<RecoveryResult> {
        Self::scan(path, false).map(|(_, result)| result)
    }

    fn scan(path: &Path, repair: bool) -> StoreResult<(Vec<LogRecord>, RecoveryResult)> {
        let mut result = RecoveryResult::default();
        if !path.exists() {
            return Ok((Vec::new(), result));
        }

        let bytes = fs::read(path)?;
        let mut records = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            match LogRecord::decode(&bytes[pos..]) {
                Decoded::Record(record, len) => {
                    result.records_recovered += 1;
                    result.last_lsn = result.last_lsn.max(record.lsn);
                    records.push(record);
                    pos += len;
                }
                Decoded::Corrupt { lsn, len } => {
                    warn!(lsn, offset = pos, "skipping corrupted log record");
                    result.records_corrupted += 1;
                    result.last_lsn = result.last_lsn.max(lsn);
                    pos += len;
                }
                Decoded::Torn => {
                    result.was_truncated = true;
                    if repair {
                        warn!(offset = pos, dropped = bytes.len() - pos, "truncating partial log record");
                        let file = OpenOptions::new().write(true).open(path)?;
                        file.set_len(pos as u64)?;
                        file.sync_all()?;
                    }
                    break;
                }
            }
        }

        Ok((records, result))
    }
}
