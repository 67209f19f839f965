//! Error taxonomy for transfers, record logs and configuration
//!
//! Only `MissingMetadata` and `Decompression` end a single transfer on the
//! server side. A checksum mismatch is not an error: it is recorded as
//! `checksum_ok = false` and feeds the analyzer.

use thiserror::Error;

/// Errors that can occur while moving, verifying or recording a transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Upload request lacked `filename` or `checksum`
    #[error("missing metadata")]
    MissingMetadata { field: &'static str },

    /// Request body was not a valid gzip stream
    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0} (must be > 0)")]
    InvalidChunkSize(usize),

    /// Server answered with `status=error`
    #[error("upload rejected by server: {reason}")]
    Rejected { reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response (HTTP {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected record log header: {found}")]
    InvalidHeader { found: String },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_metadata_reason_is_fixed() {
        let err = TransferError::MissingMetadata { field: "checksum" };
        assert_eq!(err.to_string(), "missing metadata");
    }

    #[test]
    fn test_decompression_reason_includes_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated stream");
        let err = TransferError::Decompression(cause);
        assert!(err.to_string().starts_with("decompression failed"));
        assert!(err.to_string().contains("truncated stream"));
    }
}
