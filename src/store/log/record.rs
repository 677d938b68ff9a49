//! Log record definitions
//!
//! One record per committed write or transaction.
//!
//! ## Frame Format
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────────────────────┐
//! │ LSN (8) │ CRC (4) │ Len (4) │ Data (bincode: ts, ops)      │
//! └─────────┴─────────┴─────────┴──────────────────────────────┘
//! ```
//! The CRC covers LSN, Len and Data. All integers are little-endian.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{StoreError, StoreResult};
use crate::store::Operation;

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Maximum data size of one record (64 MB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// A single record of the log
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,

    /// Operations applied together
    pub operations: Vec<Operation>,
}

/// Outcome of decoding the frame at the start of a buffer
#[derive(Debug)]
pub(crate) enum Decoded {
    /// A valid record and the number of bytes it occupied
    Record(LogRecord, usize),

    /// Intact framing but a bad checksum or body; skip `len` bytes
    Corrupt { lsn: u64, len: usize },

    /// Not enough bytes for a complete frame (partial write)
    Torn,
}

impl LogRecord {
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            timestamp,
            operations,
        }
    }

    /// Encode the record as one frame
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        let data = bincode::serialize(&(self.timestamp, &self.operations))?;
        if data.len() > MAX_RECORD_SIZE {
            return Err(StoreError::Serialization(format!(
                "Record too large: {} bytes (max {})",
                data.len(),
                MAX_RECORD_SIZE
            )));
        }

        let len = data.len() as u32;
        let crc = checksum(self.lsn, len, &data);

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + data.len());
        frame.put_u64_le(self.lsn);
        frame.put_u32_le(crc);
        frame.put_u32_le(len);
        frame.put_slice(&data);
        Ok(frame.to_vec())
    }

    /// Decode exactly one frame, failing on anything but a clean record
    pub fn deserialize(bytes: &[u8]) -> StoreResult<Self> {
        match Self::decode(bytes) {
            Decoded::Record(record, _) => Ok(record),
            Decoded::Corrupt { lsn, .. } => Err(StoreError::Corruption(format!(
                "Checksum mismatch in record {}",
                lsn
            ))),
            Decoded::Torn => Err(StoreError::Corruption(format!(
                "Incomplete record: {} bytes",
                bytes.len()
            ))),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Decoded {
        if bytes.len() < HEADER_SIZE {
            return Decoded::Torn;
        }

        let mut header = &bytes[..HEADER_SIZE];
        let lsn = header.get_u64_le();
        let crc = header.get_u32_le();
        let len = header.get_u32_le();

        // A garbage length means the frame boundary itself is lost
        let total = HEADER_SIZE + len as usize;
        if len as usize > MAX_RECORD_SIZE || bytes.len() < total {
            return Decoded::Torn;
        }

        let data = &bytes[HEADER_SIZE..total];
        if checksum(lsn, len, data) != crc {
            return Decoded::Corrupt { lsn, len: total };
        }

        match bincode::deserialize::<(u64, Vec<Operation>)>(data) {
            Ok((timestamp, operations)) => Decoded::Record(
                LogRecord {
                    lsn,
                    timestamp,
                    operations,
                },
                total,
            ),
            Err(_) => Decoded::Corrupt { lsn, len: total },
        }
    }
}

fn checksum(lsn: u64, len: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}
