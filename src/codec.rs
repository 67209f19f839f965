//! Streaming compress-and-checksum codec
//!
//! The client reads its source in fixed-size chunks. Each chunk is fed to a
//! SHA-256 hasher and a gzip encoder in the same pass, so the uncompressed side
//! never has to fit in memory. The digest always describes the *original*
//! bytes; the server compares it against whatever it ends up verifying.
//!
//! # Example
//!
//! ```
//! use sdxfer::codec::{compress_and_hash, decompress, DEFAULT_CHUNK_SIZE};
//!
//! let data = b"hello hello hello hello".to_vec();
//! let payload = compress_and_hash(&data[..], DEFAULT_CHUNK_SIZE).unwrap();
//! assert_eq!(payload.original_size, data.len() as u64);
//! assert_eq!(decompress(&payload.compressed).unwrap(), data);
//! ```

use crate::error::{Result, TransferError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Default read size for the uncompressed side (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// zlib level used for the gzip stream
pub const COMPRESSION_LEVEL: u32 = 6;

/// Output of one codec pass
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedPayload {
    /// Complete gzip stream (header, DEFLATE data, trailer)
    pub compressed: Vec<u8>,
    /// Lowercase hex SHA-256 of the uncompressed bytes
    pub checksum: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// `compressed_size / original_size`, or exactly 1.0 for empty input
    pub compression_ratio: f64,
    /// Number of non-empty chunks read from the source
    pub chunk_count: u64,
}

/// Compression ratio with the empty-input convention
pub fn compression_ratio(compressed_size: u64, original_size: u64) -> f64 {
    if original_size > 0 {
        compressed_size as f64 / original_size as f64
    } else {
        1.0
    }
}

/// Compress `source` and hash it in a single chunked pass
///
/// Nothing is returned unless the whole source was read: a read error drops
/// the partial digest and compressed buffer.
pub fn compress_and_hash<R: Read>(mut source: R, chunk_size: usize) -> Result<CompressedPayload> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }

    let mut hasher = Sha256::new();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    let mut buf = vec![0u8; chunk_size];
    let mut original_size = 0u64;
    let mut chunk_count = 0u64;

    loop {
        let n = read_chunk(&mut source, &mut buf)?;
        if n == 0 {
            break;
        }

        let chunk = &buf[..n];
        chunk_count += 1;
        original_size += n as u64;
        hasher.update(chunk);
        encoder.write_all(chunk)?;
    }

    let compressed = encoder.finish()?;
    let compressed_size = compressed.len() as u64;

    Ok(CompressedPayload {
        checksum: hex::encode(hasher.finalize()),
        compression_ratio: compression_ratio(compressed_size, original_size),
        compressed,
        original_size,
        compressed_size,
        chunk_count,
    })
}

/// Run the codec over a file on disk
pub fn compress_file(path: &Path, chunk_size: usize) -> Result<CompressedPayload> {
    let file = File::open(path)?;
    compress_and_hash(file, chunk_size)
}

/// Decode a single-member gzip stream
///
/// Malformed headers, corrupt DEFLATE data, bad trailers and truncation all
/// map to [`TransferError::Decompression`].
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(TransferError::Decompression)?;
    Ok(out)
}

/// Lowercase hex SHA-256 of a whole buffer
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fill `buf` from `source`, stopping early only at end of stream
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Reader that fails after yielding some bytes
    struct Failing {
        served: bool,
    }

    impl Read for Failing {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::other("disk went away"));
            }
            self.served = true;
            buf[0] = 7;
            Ok(1)
        }
    }

    #[test]
    fn test_empty_input_ratio_is_one() {
        let payload = compress_and_hash(&[][..], DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(payload.original_size, 0);
        assert_eq!(payload.chunk_count, 0);
        assert_eq!(payload.compression_ratio, 1.0);
        assert_eq!(payload.checksum, sha256_hex(b""));
        assert!(decompress(&payload.compressed).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_count_uses_fixed_chunks() {
        let data = vec![3u8; 10];
        let payload = compress_and_hash(Trickle { data: &data, step: 3 }, 4).unwrap();
        // 4 + 4 + 2, even though the reader only yields 3 bytes at a time
        assert_eq!(payload.chunk_count, 3);
        assert_eq!(payload.original_size, 10);
    }

    #[test]
    fn test_digest_matches_whole_buffer_hash() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let payload = compress_and_hash(&data[..], 64).unwrap();
        assert_eq!(payload.checksum, sha256_hex(&data));
        assert_eq!(payload.checksum, payload.checksum.to_lowercase());
        assert_eq!(payload.checksum.len(), 64);
    }

    #[test]
    fn test_ratio_matches_sizes() {
        let data = vec![b'a'; 100_000];
        let payload = compress_and_hash(&data[..], 4096).unwrap();
        assert_eq!(payload.compressed_size, payload.compressed.len() as u64);
        let expected = payload.compressed_size as f64 / payload.original_size as f64;
        assert!((payload.compression_ratio - expected).abs() < 1e-12);
        assert!(payload.compression_ratio < 0.1);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = compress_and_hash(&b"abc"[..], 0);
        assert!(matches!(result, Err(TransferError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_read_failure_returns_no_output() {
        let result = compress_and_hash(Failing { served: false }, 16);
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let result = decompress(b"definitely not gzip");
        assert!(matches!(result, Err(TransferError::Decompression(_))));
    }

    #[test]
    fn test_decompress_rejects_truncated_stream() {
        let data = vec![42u8; 4096];
        let payload = compress_and_hash(&data[..], 1024).unwrap();
        let truncated = &payload.compressed[..payload.compressed.len() - 6];
        assert!(matches!(
            decompress(truncated),
            Err(TransferError::Decompression(_))
        ));
    }
}
