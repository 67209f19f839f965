//! Property-based tests for the streaming codec
//!
//! The codec must agree with a one-shot hash and decompress back to the
//! input no matter how the source is chunked.

use proptest::prelude::*;
use sdxfer::codec::{compress_and_hash, compression_ratio, decompress, sha256_hex};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_decompress_restores_input(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        chunk_size in 1usize..4096,
    ) {
        let payload = compress_and_hash(&data[..], chunk_size).unwrap();
        prop_assert_eq!(decompress(&payload.compressed).unwrap(), data);
    }

    #[test]
    fn prop_digest_independent_of_chunk_size(
        data in prop::collection::vec(any::<u8>(), 0..8_000),
        a in 1usize..512,
        b in 512usize..8192,
    ) {
        let small = compress_and_hash(&data[..], a).unwrap();
        let large = compress_and_hash(&data[..], b).unwrap();
        prop_assert_eq!(&small.checksum, &large.checksum);
        prop_assert_eq!(&small.checksum, &sha256_hex(&data));
        prop_assert_eq!(small.original_size, data.len() as u64);
    }

    #[test]
    fn prop_sizes_and_ratio_consistent(
        data in prop::collection::vec(any::<u8>(), 1..8_000),
        chunk_size in 1usize..2048,
    ) {
        let payload = compress_and_hash(&data[..], chunk_size).unwrap();
        prop_assert_eq!(payload.compressed_size, payload.compressed.len() as u64);
        let expected = payload.compressed_size as f64 / payload.original_size as f64;
        prop_assert!((payload.compression_ratio - expected).abs() < 1e-12);
        prop_assert_eq!(
            payload.chunk_count as usize,
            data.len().div_ceil(chunk_size)
        );
    }

    #[test]
    fn prop_digest_is_lowercase_hex(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let digest = sha256_hex(&data);
        prop_assert_eq!(digest.len(), 64);
        prop_assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}

#[test]
fn test_empty_input_ratio_is_one() {
    let payload = compress_and_hash(&[][..], 1024).unwrap();
    assert_eq!(payload.original_size, 0);
    assert_eq!(payload.compression_ratio, 1.0);
    assert_eq!(compression_ratio(20, 0), 1.0);
    assert_eq!(
        payload.checksum,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}
