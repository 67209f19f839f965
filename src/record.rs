//! Transfer record: one row per completed upload

use crate::codec::compression_ratio;
use crate::protocol::UploadReceipt;
use serde::{Deserialize, Serialize};

/// Outcome of one completed upload, as seen by client and server
///
/// `failed` is fixed when the record is built and is the only failure signal
/// the analyzer uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    /// Client-observed round trip of the upload call
    pub latency_ms: f64,
    pub is_large_file: bool,
    pub bug_triggered: bool,
    pub checksum_ok: bool,
    pub failed: bool,
}

impl TransferRecord {
    /// Build a record, deriving `compression_ratio` and `failed`
    pub fn new(
        file_name: impl Into<String>,
        original_size: u64,
        compressed_size: u64,
        latency_ms: f64,
        is_large_file: bool,
        bug_triggered: bool,
        checksum_ok: bool,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(compressed_size, original_size),
            latency_ms: latency_ms.max(0.0),
            is_large_file,
            bug_triggered,
            checksum_ok,
            failed: !checksum_ok,
        }
    }

    /// Combine client-side sizes and timing with the server's self-report
    pub fn from_receipt(
        file_name: impl Into<String>,
        original_size: u64,
        compressed_size: u64,
        latency_ms: f64,
        receipt: &UploadReceipt,
    ) -> Self {
        Self::new(
            file_name,
            original_size,
            compressed_size,
            latency_ms,
            receipt.is_large_file,
            receipt.bug_triggered,
            receipt.checksum_ok,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_is_negated_checksum() {
        let ok = TransferRecord::new("a.bin", 10, 5, 1.0, false, false, true);
        assert!(!ok.failed);
        let bad = TransferRecord::new("b.bin", 10, 5, 1.0, true, true, false);
        assert!(bad.failed);
    }

    #[test]
    fn test_ratio_for_empty_file() {
        let record = TransferRecord::new("empty", 0, 20, 0.5, false, false, true);
        assert_eq!(record.compression_ratio, 1.0);
    }

    #[test]
    fn test_negative_latency_clamped() {
        let record = TransferRecord::new("x", 1, 1, -3.0, false, false, true);
        assert_eq!(record.latency_ms, 0.0);
    }
}
