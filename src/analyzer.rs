//! Statistical fault localization over transfer records
//!
//! Every record is reduced to a fixed set of boolean predicates. For each
//! predicate P the analyzer counts how many failing and passing transfers
//! satisfy it, then scores:
//!
//! - `Failure(P)  = failed_P / total_failed` (0 when nothing failed)
//! - `Increase(P) = failed_P / support - baseline_failure_rate`
//!
//! Predicates are ranked by `Increase`, then `Failure`, with ties kept in
//! predicate order. Predicates that never held are left out of the ranking.

use crate::oracle::LARGE_FILE_THRESHOLD;
use crate::record::TransferRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Latency above which a transfer counts as slow (milliseconds)
pub const HIGH_LATENCY_MS: f64 = 200.0;

/// Compression ratio above which data counts as poorly compressible
pub const HIGH_COMPRESSION_RATIO: f64 = 0.8;

/// Size above which a file counts as very large (50 MiB)
pub const VERY_LARGE_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Size below which a file counts as small (100 KiB)
pub const SMALL_FILE_BYTES: u64 = 100 * 1024;

/// Candidate explanations for a failed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Predicate {
    #[serde(rename = "P1_is_large_file")]
    IsLargeFile,
    #[serde(rename = "P2_bug_triggered")]
    BugTriggered,
    #[serde(rename = "P3_checksum_failed")]
    ChecksumFailed,
    #[serde(rename = "P4_high_latency")]
    HighLatency,
    #[serde(rename = "P5_high_compression_ratio")]
    HighCompressionRatio,
    #[serde(rename = "P6_very_large_file")]
    VeryLargeFile,
    #[serde(rename = "P7_small_file")]
    SmallFile,
    #[serde(rename = "P8_medium_file")]
    MediumFile,
}

impl Predicate {
    /// All predicates, in reporting order P1..P8
    pub const ALL: [Predicate; 8] = [
        Predicate::IsLargeFile,
        Predicate::BugTriggered,
        Predicate::ChecksumFailed,
        Predicate::HighLatency,
        Predicate::HighCompressionRatio,
        Predicate::VeryLargeFile,
        Predicate::SmallFile,
        Predicate::MediumFile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Predicate::IsLargeFile => "P1_is_large_file",
            Predicate::BugTriggered => "P2_bug_triggered",
            Predicate::ChecksumFailed => "P3_checksum_failed",
            Predicate::HighLatency => "P4_high_latency",
            Predicate::HighCompressionRatio => "P5_high_compression_ratio",
            Predicate::VeryLargeFile => "P6_very_large_file",
            Predicate::SmallFile => "P7_small_file",
            Predicate::MediumFile => "P8_medium_file",
        }
    }

    /// Evaluate the predicate on one record
    pub fn holds(&self, record: &TransferRecord) -> bool {
        match self {
            Predicate::IsLargeFile => record.is_large_file,
            Predicate::BugTriggered => record.bug_triggered,
            Predicate::ChecksumFailed => !record.checksum_ok,
            Predicate::HighLatency => record.latency_ms > HIGH_LATENCY_MS,
            Predicate::HighCompressionRatio => record.compression_ratio > HIGH_COMPRESSION_RATIO,
            Predicate::VeryLargeFile => record.original_size > VERY_LARGE_FILE_BYTES,
            Predicate::SmallFile => record.original_size < SMALL_FILE_BYTES,
            Predicate::MediumFile => {
                (SMALL_FILE_BYTES..=LARGE_FILE_THRESHOLD).contains(&record.original_size)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Population-wide failure numbers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Baseline {
    pub total_runs: u64,
    pub total_failed: u64,
    pub total_passed: u64,
    #[serde(rename = "baseline_failure_rate")]
    pub failure_rate: f64,
}

impl Baseline {
    pub fn from_records(records: &[TransferRecord]) -> Self {
        let total_runs = records.len() as u64;
        let total_failed = records.iter().filter(|r| r.failed).count() as u64;
        let failure_rate = if total_runs > 0 {
            total_failed as f64 / total_runs as f64
        } else {
            0.0
        };
        Self {
            total_runs,
            total_failed,
            total_passed: total_runs - total_failed,
            failure_rate,
        }
    }
}

/// Counts and scores for one predicate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredicateStats {
    pub predicate: Predicate,
    /// Records where the predicate holds
    pub support: u64,
    #[serde(rename = "failed_P")]
    pub failed: u64,
    #[serde(rename = "passed_P")]
    pub passed: u64,
    /// Share of all failures that satisfy the predicate
    #[serde(rename = "failure_P")]
    pub failure: f64,
    /// Failure rate under the predicate minus the baseline rate
    pub increase: f64,
}

impl PredicateStats {
    fn empty(predicate: Predicate) -> Self {
        Self {
            predicate,
            support: 0,
            failed: 0,
            passed: 0,
            failure: 0.0,
            increase: 0.0,
        }
    }

    /// `failed / support`, or 0 without support
    pub fn failure_rate(&self) -> f64 {
        if self.support > 0 {
            self.failed as f64 / self.support as f64
        } else {
            0.0
        }
    }

    fn score(&mut self, baseline: &Baseline) {
        self.failure = if baseline.total_failed > 0 {
            self.failed as f64 / baseline.total_failed as f64
        } else {
            0.0
        };
        self.increase = self.failure_rate() - baseline.failure_rate;
    }
}

/// Ranking order: higher increase first, then higher failure share
fn rank_order(a: &PredicateStats, b: &PredicateStats) -> Ordering {
    b.increase
        .total_cmp(&a.increase)
        .then_with(|| b.failure.total_cmp(&a.failure))
}

/// Result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub baseline: Baseline,
    /// Predicates with non-zero support, best explanation first
    pub predicates: Vec<PredicateStats>,
}

impl Analysis {
    /// True when there were no records to analyze
    pub fn is_empty(&self) -> bool {
        self.baseline.total_runs == 0
    }

    pub fn get(&self, predicate: Predicate) -> Option<&PredicateStats> {
        self.predicates.iter().find(|s| s.predicate == predicate)
    }

    /// Human-readable baseline block and ranked table
    pub fn render_text(&self) -> String {
        let b = &self.baseline;
        let mut out = String::new();
        out.push_str("=== Baseline ===\n");
        out.push_str(&format!("Total runs:      {}\n", b.total_runs));
        out.push_str(&format!("Total failed:    {}\n", b.total_failed));
        out.push_str(&format!("Total passed:    {}\n", b.total_passed));
        out.push_str(&format!("Failure rate:    {:.3}\n", b.failure_rate));
        out.push('\n');

        if self.is_empty() {
            out.push_str("No transfer records. Run the client first.\n");
            return out;
        }
        if self.predicates.is_empty() {
            out.push_str("No predicates had support (never true).\n");
            return out;
        }

        out.push_str("=== Predicates ranked by Increase(P) (and Failure(P)) ===\n");
        out.push_str(&format!(
            "{:<30} {:>8} {:>9} {:>9} {:>11} {:>10}\n",
            "Predicate", "support", "failed_P", "passed_P", "Failure(P)", "Increase"
        ));
        for s in &self.predicates {
            out.push_str(&format!(
                "{:<30} {:>8} {:>9} {:>9} {:>11.3} {:>10.3}\n",
                s.predicate.name(),
                s.support,
                s.failed,
                s.passed,
                s.failure,
                s.increase
            ));
        }
        out
    }
}

/// Analyze a batch of records
///
/// Records are only read. An empty batch yields a zero baseline and an empty
/// ranking without evaluating any predicate.
pub fn analyze(records: &[TransferRecord]) -> Analysis {
    let baseline = Baseline::from_records(records);
    if baseline.total_runs == 0 {
        return Analysis {
            baseline,
            predicates: Vec::new(),
        };
    }

    let mut stats: Vec<PredicateStats> =
        Predicate::ALL.iter().copied().map(PredicateStats::empty).collect();

    for record in records {
        for s in stats.iter_mut() {
            if !s.predicate.holds(record) {
                continue;
            }
            s.support += 1;
            if record.failed {
                s.failed += 1;
            } else {
                s.passed += 1;
            }
        }
    }

    stats.retain(|s| s.support > 0);
    for s in stats.iter_mut() {
        s.score(&baseline);
    }
    // Stable sort keeps P1..P8 order among exact ties
    stats.sort_by(rank_order);

    tracing::debug!(
        records = baseline.total_runs,
        failed = baseline.total_failed,
        ranked = stats.len(),
        "analysis complete"
    );

    Analysis {
        baseline,
        predicates: stats,
    }
}
