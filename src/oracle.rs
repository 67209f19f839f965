//! Server-side corruption oracle
//!
//! Probabilistically zeroes the tail of large payloads *before* the server
//! verifies their checksum. Sizes are untouched, so only a byte-exact digest
//! comparison can notice the damage.
//!
//! The random source is injected, so tests can pin the draw with a seeded
//! `StdRng` or a `StepRng` instead of relying on thread-local entropy.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Payloads strictly larger than this are eligible (10 MiB)
pub const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Default trigger probability for eligible payloads
pub const DEFAULT_PROBABILITY: f64 = 0.3;

/// Number of trailing bytes overwritten with zeros
pub const CORRUPT_TAIL_BYTES: usize = 1024;

/// Oracle policy knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Trigger probability (0.0-1.0)
    pub probability: f64,
    /// Size above which corruption may trigger
    pub threshold_bytes: u64,
    /// Length of the zeroed tail
    pub span_bytes: usize,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: DEFAULT_PROBABILITY,
            threshold_bytes: LARGE_FILE_THRESHOLD,
            span_bytes: CORRUPT_TAIL_BYTES,
            seed: None,
        }
    }
}

impl OracleConfig {
    /// Configuration with the defect switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set trigger probability, clamped to 0.0-1.0
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_threshold(mut self, threshold_bytes: u64) -> Self {
        self.threshold_bytes = threshold_bytes;
        self
    }

    pub fn with_span(mut self, span_bytes: usize) -> Self {
        self.span_bytes = span_bytes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Whether a payload of `original_size` bytes is eligible at all
    pub fn is_eligible(&self, original_size: u64) -> bool {
        self.enabled && original_size > self.threshold_bytes
    }
}

/// Probabilistic tail corruption with an injectable random source
///
/// The generator sits behind a mutex so concurrent request threads each take
/// their own independent draw; nothing is cached between requests.
#[derive(Debug)]
pub struct CorruptionOracle<R = StdRng> {
    config: OracleConfig,
    rng: Mutex<R>,
}

impl CorruptionOracle<StdRng> {
    /// Build an oracle, seeding from `config.seed` or OS entropy
    pub fn new(config: OracleConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Restart the random sequence from `seed`
    pub fn reseed(&self, seed: u64) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        *rng = StdRng::seed_from_u64(seed);
    }
}

impl<R: RngCore> CorruptionOracle<R> {
    /// Build an oracle around a caller-supplied generator
    pub fn with_rng(config: OracleConfig, rng: R) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Possibly corrupt `payload`, returning whether corruption triggered
    ///
    /// Draws exactly one uniform sample for eligible payloads and none
    /// otherwise. A triggered payload shorter than the span is reported as
    /// corrupted even though no byte changes.
    pub fn maybe_corrupt(&self, payload: &mut [u8], original_size: u64) -> bool {
        if !self.config.is_eligible(original_size) {
            return false;
        }

        let sample: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen()
        };
        if sample >= self.config.probability {
            return false;
        }

        let span = self.config.span_bytes;
        if payload.len() >= span {
            let start = payload.len() - span;
            payload[start..].fill(0);
        }

        tracing::debug!(
            original_size,
            span,
            overwritten = payload.len() >= span,
            "corruption triggered"
        );
        true
    }
}
