//! Synthetic client file set
//!
//! Produces a mix of compressible text and incompressible binary files that
//! straddles every size band the analyzer cares about: small (< 100 KiB),
//! medium, large (> 10 MiB) and very large (> 50 MiB).

use crate::error::Result;
use rand::{Rng, RngCore};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Block size used when streaming generated data to disk
const BLOCK: usize = 1024 * 1024;

const TEXT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \n";

/// Content style of a generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    /// Random ASCII letters, digits, spaces and newlines
    Text,
    /// Uniform random bytes
    Binary,
}

/// One file to generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub name: String,
    pub size: u64,
    pub content: Content,
}

impl FileSpec {
    fn new(name: impl Into<String>, size: u64, content: Content) -> Self {
        Self {
            name: name.into(),
            size,
            content,
        }
    }
}

/// The standard file set
pub fn standard_set() -> Vec<FileSpec> {
    let mut specs = Vec::new();

    let small = [5_000, 10_000, 20_000, 30_000, 40_000, 50_000];
    for (i, size) in small.into_iter().enumerate() {
        specs.push(FileSpec::new(
            format!("small_text_{}.txt", i + 1),
            size,
            Content::Text,
        ));
    }

    let medium = [100_000, 250_000, 500_000, 1_000_000];
    for (i, size) in medium.into_iter().enumerate() {
        let n = i + 1;
        specs.push(if n % 2 == 1 {
            FileSpec::new(format!("medium_text_{}.txt", n), size, Content::Text)
        } else {
            FileSpec::new(format!("medium_bin_{}.bin", n), size, Content::Binary)
        });
    }

    let large = [
        5_000_000,
        10_000_000,
        20_000_000,
        50_000_000,
        75_000_000,
        100_000_000,
    ];
    for (i, size) in large.into_iter().enumerate() {
        specs.push(FileSpec::new(
            format!("large_{}.bin", i + 1),
            size,
            Content::Binary,
        ));
    }

    specs
}

/// Extra file kept across runs so repeated experiments share one input
pub fn big_test_file() -> FileSpec {
    FileSpec::new("big_test.bin", 20_000_000, Content::Binary)
}

/// Write `spec` into `dir`, streaming from `rng`
pub fn write_file<R: RngCore>(dir: &Path, spec: &FileSpec, rng: &mut R) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&spec.name);
    let mut out = BufWriter::new(File::create(&path)?);

    let mut block = vec![0u8; BLOCK];
    let mut remaining = spec.size;
    while remaining > 0 {
        let n = remaining.min(BLOCK as u64) as usize;
        fill(&mut block[..n], spec.content, rng);
        out.write_all(&block[..n])?;
        remaining -= n as u64;
    }
    out.flush()?;

    tracing::info!(file = %spec.name, size = spec.size, "generated file");
    Ok(path)
}

fn fill<R: RngCore>(buf: &mut [u8], content: Content, rng: &mut R) {
    match content {
        Content::Binary => rng.fill_bytes(buf),
        Content::Text => {
            for slot in buf.iter_mut() {
                *slot = TEXT_ALPHABET[rng.gen_range(0..TEXT_ALPHABET.len())];
            }
        }
    }
}

/// Generate the standard set (plus `big_test.bin` when absent) into `dir`
///
/// Files larger than `max_size` are skipped.
pub fn generate<R: RngCore>(
    dir: &Path,
    max_size: Option<u64>,
    rng: &mut R,
) -> Result<Vec<PathBuf>> {
    let fits = |spec: &FileSpec| max_size.map_or(true, |max| spec.size <= max);

    let mut written = Vec::new();
    for spec in &standard_set() {
        if fits(spec) {
            written.push(write_file(dir, spec, rng)?);
        }
    }

    let big = big_test_file();
    if fits(&big) && !dir.join(&big.name).exists() {
        written.push(write_file(dir, &big, rng)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_standard_set_covers_size_bands() {
        let specs = standard_set();
        assert_eq!(specs.len(), 16);
        assert!(specs.iter().any(|s| s.size < 100 * 1024));
        assert!(specs.iter().any(|s| s.size > 10 * 1024 * 1024));
        assert!(specs.iter().any(|s| s.size > 50 * 1024 * 1024));
        assert_eq!(specs[7].name, "medium_bin_2.bin");
    }

    #[test]
    fn test_text_content_is_ascii() {
        let dir = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let spec = FileSpec::new("t.txt", 3000, Content::Text);
        let path = write_file(dir.path(), &spec, &mut rng).unwrap();
        let data = fs::read(path).unwrap();
        assert_eq!(data.len(), 3000);
        assert!(data.iter().all(|b| TEXT_ALPHABET.contains(b)));
    }

    #[test]
    fn test_generate_respects_max_size() {
        let dir = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let written = generate(dir.path(), Some(20_000), &mut rng).unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|p| fs::metadata(p).unwrap().len() <= 20_000));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let spec = FileSpec::new("b.bin", 4096, Content::Binary);
        let a = write_file(&dir.path().join("a"), &spec, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = write_file(&dir.path().join("b"), &spec, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }
}
