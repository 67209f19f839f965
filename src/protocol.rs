//! Upload request/response contract and the server-side handling pipeline
//!
//! A single upload is one request: metadata in the query string, a gzip body,
//! and one [`UploadResult`] back. The server works through these steps in
//! order:
//!
//! 1. reject requests missing `filename` or `checksum` (body left unread)
//! 2. read the whole compressed body
//! 3. decompress it, rejecting malformed streams
//! 4. classify the payload as large or not
//! 5. let the [`CorruptionOracle`] damage it
//! 6. hash the possibly corrupted bytes and compare with the client digest
//! 7. hand the bytes to the background writer without waiting
//! 8. report the outcome
//!
//! Corrupting before hashing is the point of the exercise: sizes still agree,
//! so only the digest comparison exposes the defect.

use crate::codec::{self, CompressedPayload};
use crate::error::{Result, TransferError};
use crate::oracle::CorruptionOracle;
use crate::telemetry::Reporter;
use crate::writer_pool::PayloadSink;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

/// Metadata the client attaches to an upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub filename: String,
    /// Lowercase hex SHA-256 of the uncompressed file
    pub checksum: String,
    /// Informational only; never validated by the server
    pub compression_ratio: String,
}

impl UploadMetadata {
    /// Metadata for a file the codec has just processed
    pub fn for_payload(filename: impl Into<String>, payload: &CompressedPayload) -> Self {
        Self {
            filename: filename.into(),
            checksum: payload.checksum.clone(),
            compression_ratio: payload.compression_ratio.to_string(),
        }
    }

    /// Query-string pairs in wire order
    pub fn query_pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("filename", self.filename.as_str()),
            ("checksum", self.checksum.as_str()),
            ("compression_ratio", self.compression_ratio.as_str()),
        ]
    }
}

/// Metadata as received by the server, where any field may be absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub checksum: Option<String>,
    pub compression_ratio: Option<String>,
}

impl UploadQuery {
    /// Collect known keys from decoded query pairs; first occurrence wins
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "filename" => &mut query.filename,
                "checksum" => &mut query.checksum,
                "compression_ratio" => &mut query.compression_ratio,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        query
    }

    /// Validate required fields, treating empty strings as missing
    fn required(&self) -> Result<(&str, &str)> {
        let filename = non_empty(&self.filename).ok_or(TransferError::MissingMetadata {
            field: "filename",
        })?;
        let checksum = non_empty(&self.checksum).ok_or(TransferError::MissingMetadata {
            field: "checksum",
        })?;
        Ok((filename, checksum))
    }
}

impl From<&UploadMetadata> for UploadQuery {
    fn from(meta: &UploadMetadata) -> Self {
        Self {
            filename: Some(meta.filename.clone()),
            checksum: Some(meta.checksum.clone()),
            compression_ratio: Some(meta.compression_ratio.clone()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Facts the server reports for an accepted upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub checksum_ok: bool,
    /// Digest of the bytes the server actually verified
    pub server_checksum: String,
    /// Echo of the client's value
    pub compression_ratio: Option<String>,
    /// Decompressed size as seen by the server
    pub original_size: u64,
    pub compressed_size: u64,
    pub is_large_file: bool,
    pub bug_triggered: bool,
}

/// Structured response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResult {
    Ok(UploadReceipt),
    Error { reason: String },
}

impl UploadResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, UploadResult::Ok(_))
    }

    pub fn receipt(&self) -> Option<&UploadReceipt> {
        match self {
            UploadResult::Ok(receipt) => Some(receipt),
            UploadResult::Error { .. } => None,
        }
    }
}

impl From<Result<UploadReceipt>> for UploadResult {
    fn from(result: Result<UploadReceipt>) -> Self {
        match result {
            Ok(receipt) => UploadResult::Ok(receipt),
            Err(e) => UploadResult::Error {
                reason: e.to_string(),
            },
        }
    }
}

/// Server-side upload pipeline, shared by all request threads
pub struct UploadHandler<R = rand::rngs::StdRng> {
    oracle: CorruptionOracle<R>,
    sink: Arc<dyn PayloadSink>,
    reporter: Arc<dyn Reporter>,
}

impl<R: RngCore> UploadHandler<R> {
    pub fn new(
        oracle: CorruptionOracle<R>,
        sink: Arc<dyn PayloadSink>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            oracle,
            sink,
            reporter,
        }
    }

    pub fn oracle(&self) -> &CorruptionOracle<R> {
        &self.oracle
    }

    /// Run one upload through the pipeline
    pub fn handle<B: Read>(&self, query: &UploadQuery, body: B) -> UploadResult {
        let start = Instant::now();
        let label = query.filename.as_deref().unwrap_or("");
        self.reporter.upload_started(label);

        let result: UploadResult = self.process(query, body).into();

        match &result {
            UploadResult::Ok(receipt) => tracing::info!(
                file = %receipt.filename,
                original_size = receipt.original_size,
                compressed_size = receipt.compressed_size,
                is_large_file = receipt.is_large_file,
                bug_triggered = receipt.bug_triggered,
                checksum_ok = receipt.checksum_ok,
                "upload processed"
            ),
            UploadResult::Error { reason } => {
                tracing::warn!(file = %label, reason = %reason, "upload rejected")
            }
        }

        self.reporter.upload_finished(label, &result, start.elapsed());
        result
    }

    fn process<B: Read>(&self, query: &UploadQuery, mut body: B) -> Result<UploadReceipt> {
        let (filename, checksum) = query.required()?;

        let mut compressed = Vec::new();
        body.read_to_end(&mut compressed)?;
        let compressed_size = compressed.len() as u64;

        let mut payload = codec::decompress(&compressed)?;
        drop(compressed);

        let original_size = payload.len() as u64;
        let is_large_file = original_size > self.oracle.config().threshold_bytes;

        let bug_triggered = self.oracle.maybe_corrupt(&mut payload, original_size);
        if bug_triggered {
            tracing::info!(file = %filename, original_size, "corruption oracle triggered");
        }

        let server_checksum = codec::sha256_hex(&payload);
        let checksum_ok = server_checksum.eq_ignore_ascii_case(checksum);
        if !checksum_ok {
            tracing::warn!(
                file = %filename,
                expected = %checksum,
                actual = %server_checksum,
                "checksum mismatch"
            );
        }

        self.sink.schedule(filename, payload);

        Ok(UploadReceipt {
            filename: filename.to_string(),
            checksum_ok,
            server_checksum,
            compression_ratio: query.compression_ratio.clone(),
            original_size,
            compressed_size,
            is_large_file,
            bug_triggered,
        })
    }
}
