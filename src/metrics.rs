//! Prometheus counters and histograms for uploads
//!
//! ## Metrics
//!
//! **Server:**
//! - `server_files_processed_total` - accepted uploads by `checksum_ok`
//! - `server_file_write_latency_ms` - receipt of the body to write scheduled
//!
//! **Client:**
//! - `client_files_sent_total` - uploads by `success`
//! - `client_file_transfer_latency_ms` - upload round trip
//!
//! The server renders them at `GET /metrics`; the client can dump them to a
//! file after a run.

use crate::codec::CompressedPayload;
use crate::protocol::UploadResult;
use crate::telemetry::Reporter;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

const LATENCY_BUCKETS_MS: [f64; 10] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

/// Which side of the transfer is recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Metric collection for one process
#[derive(Clone)]
pub struct TransferMetrics {
    pub registry: Registry,

    pub files_processed_total: IntCounterVec,
    pub file_write_latency_ms: HistogramVec,
    pub files_sent_total: IntCounterVec,
    pub file_transfer_latency_ms: HistogramVec,
}

impl TransferMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let files_processed_total = IntCounterVec::new(
            Opts::new(
                "server_files_processed_total",
                "Total number of files processed by the server",
            ),
            &["checksum_ok"],
        )?;
        registry.register(Box::new(files_processed_total.clone()))?;

        let file_write_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "server_file_write_latency_ms",
                "Time from receiving compressed body to scheduling write",
            )
            .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["checksum_ok"],
        )?;
        registry.register(Box::new(file_write_latency_ms.clone()))?;

        let files_sent_total = IntCounterVec::new(
            Opts::new(
                "client_files_sent_total",
                "Total number of files sent by the client",
            ),
            &["success"],
        )?;
        registry.register(Box::new(files_sent_total.clone()))?;

        let file_transfer_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "client_file_transfer_latency_ms",
                "Latency of file upload from client perspective",
            )
            .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["success"],
        )?;
        registry.register(Box::new(file_transfer_latency_ms.clone()))?;

        Ok(Self {
            registry,
            files_processed_total,
            file_write_latency_ms,
            files_sent_total,
            file_transfer_latency_ms,
        })
    }

    /// Record one request handled by the server
    ///
    /// Rejected uploads are not counted as processed.
    pub fn record_processed(&self, result: &UploadResult, elapsed: Duration) {
        let Some(receipt) = result.receipt() else {
            return;
        };
        let label = bool_label(receipt.checksum_ok);
        self.files_processed_total.with_label_values(&[label]).inc();
        self.file_write_latency_ms
            .with_label_values(&[label])
            .observe(as_ms(elapsed));
    }

    /// Record one upload attempt made by the client
    pub fn record_sent(&self, result: &UploadResult, elapsed: Duration) {
        let label = bool_label(result.is_ok());
        self.files_sent_total.with_label_values(&[label]).inc();
        self.file_transfer_latency_ms
            .with_label_values(&[label])
            .observe(as_ms(elapsed));
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn as_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Reporter that records metrics and forwards every hook to `inner`
pub struct MetricsReporter {
    inner: Arc<dyn Reporter>,
    metrics: TransferMetrics,
    role: Role,
}

impl MetricsReporter {
    pub fn new(inner: Arc<dyn Reporter>, metrics: TransferMetrics, role: Role) -> Self {
        Self {
            inner,
            metrics,
            role,
        }
    }

    pub fn metrics(&self) -> &TransferMetrics {
        &self.metrics
    }
}

impl Reporter for MetricsReporter {
    fn codec_started(&self, file_name: &str) {
        self.inner.codec_started(file_name);
    }

    fn codec_finished(&self, file_name: &str, payload: &CompressedPayload, elapsed: Duration) {
        self.inner.codec_finished(file_name, payload, elapsed);
    }

    fn upload_started(&self, file_name: &str) {
        self.inner.upload_started(file_name);
    }

    fn upload_finished(&self, file_name: &str, result: &UploadResult, elapsed: Duration) {
        match self.role {
            Role::Server => self.metrics.record_processed(result, elapsed),
            Role::Client => self.metrics.record_sent(result, elapsed),
        }
        self.inner.upload_finished(file_name, result, elapsed);
    }
}
