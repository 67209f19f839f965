//! Instrumentation hooks for the codec pass and upload handling
//!
//! The core calls a narrow [`Reporter`] at four fixed points and never depends
//! on what the reporter does with them. [`LogReporter`] turns them into
//! `tracing` events; [`OtlpReporter`] (feature `otlp`) exports them as
//! OpenTelemetry spans via OTLP.
//!
//! # Example
//!
//! ```bash
//! sdxfer serve --otlp-endpoint http://localhost:4317 --sampling 0.2
//! ```

use crate::codec::CompressedPayload;
use crate::protocol::UploadResult;
use std::time::Duration;

#[cfg(feature = "otlp")]
use anyhow::Result;
#[cfg(feature = "otlp")]
use opentelemetry::{
    trace::{Span, SpanKind, Status, Tracer, TracerProvider as _},
    KeyValue,
};
#[cfg(feature = "otlp")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otlp")]
use opentelemetry_sdk::{
    trace::{BatchSpanProcessor, Sampler, SdkTracerProvider as TracerProvider},
    Resource,
};
#[cfg(feature = "otlp")]
use std::time::SystemTime;

/// Receives lifecycle notifications from the codec and the upload path
pub trait Reporter: Send + Sync {
    fn codec_started(&self, _file_name: &str) {}

    fn codec_finished(&self, _file_name: &str, _payload: &CompressedPayload, _elapsed: Duration) {
    }

    fn upload_started(&self, _file_name: &str) {}

    fn upload_finished(&self, _file_name: &str, _result: &UploadResult, _elapsed: Duration) {}
}

/// Reporter that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Reporter that emits `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn codec_started(&self, file_name: &str) {
        tracing::debug!(file = %file_name, "codec pass started");
    }

    fn codec_finished(&self, file_name: &str, payload: &CompressedPayload, elapsed: Duration) {
        tracing::info!(
            file = %file_name,
            original_size = payload.original_size,
            compressed_size = payload.compressed_size,
            ratio = payload.compression_ratio,
            chunks = payload.chunk_count,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "codec pass finished"
        );
    }

    fn upload_started(&self, file_name: &str) {
        tracing::debug!(file = %file_name, "upload started");
    }

    fn upload_finished(&self, file_name: &str, result: &UploadResult, elapsed: Duration) {
        tracing::debug!(
            file = %file_name,
            ok = result.is_ok(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "upload finished"
        );
    }
}

/// Parse a sampling setting into a trace ratio
///
/// `"always_on"` means 1.0, a number in 0.0-1.0 is used as is, and anything
/// else falls back to full sampling.
pub fn parse_sampling(sampling: &str) -> f64 {
    let sampling = sampling.trim();
    if sampling.eq_ignore_ascii_case("always_on") {
        return 1.0;
    }
    match sampling.parse::<f64>() {
        Ok(ratio) if (0.0..=1.0).contains(&ratio) => ratio,
        _ => {
            tracing::warn!(sampling = %sampling, "unrecognised sampling setting, keeping all traces");
            1.0
        }
    }
}

/// Configuration for the OTLP reporter
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    /// OTLP endpoint URL (e.g., "http://localhost:4317")
    pub endpoint: String,
    /// Service name for traces
    pub service_name: String,
    /// Fraction of traces kept (0.0-1.0)
    pub sample_ratio: f64,
}

/// OTLP span exporter behind the [`Reporter`] hooks
#[cfg(feature = "otlp")]
pub struct OtlpReporter {
    _runtime: tokio::runtime::Runtime, // Tokio runtime for async OTLP operations
    provider: TracerProvider,
    log: LogReporter,
}

#[cfg(feature = "otlp")]
impl OtlpReporter {
    /// Create a new OTLP reporter
    pub fn new(config: OtlpConfig) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("Failed to create Tokio runtime: {}", e))?;

        let provider = runtime.block_on(async {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&config.endpoint)
                .build()?;

            let span_processor = BatchSpanProcessor::builder(exporter).build();

            let resource = Resource::builder()
                .with_service_name(config.service_name.clone())
                .build();

            let provider = TracerProvider::builder()
                .with_span_processor(span_processor)
                .with_sampler(Sampler::TraceIdRatioBased(config.sample_ratio.clamp(0.0, 1.0)))
                .with_resource(resource)
                .build();

            Ok::<_, anyhow::Error>(provider)
        })?;

        Ok(OtlpReporter {
            _runtime: runtime,
            provider,
            log: LogReporter,
        })
    }

    /// Emit a finished span that started `elapsed` ago
    fn export_span(
        &self,
        name: &'static str,
        elapsed: Duration,
        attributes: Vec<KeyValue>,
        error: Option<String>,
    ) {
        let tracer = self.provider.tracer("sdxfer");
        let start = SystemTime::now()
            .checked_sub(elapsed)
            .unwrap_or_else(SystemTime::now);

        let mut span = tracer
            .span_builder(name)
            .with_kind(SpanKind::Internal)
            .with_start_time(start)
            .with_attributes(attributes)
            .start(&tracer);

        match error {
            Some(description) => span.set_status(Status::Error {
                description: description.into(),
            }),
            None => span.set_status(Status::Ok),
        }
        span.end();
    }
}

#[cfg(feature = "otlp")]
impl Reporter for OtlpReporter {
    fn codec_started(&self, file_name: &str) {
        self.log.codec_started(file_name);
    }

    fn codec_finished(&self, file_name: &str, payload: &CompressedPayload, elapsed: Duration) {
        self.log.codec_finished(file_name, payload, elapsed);
        self.export_span(
            "compress_and_hash",
            elapsed,
            vec![
                KeyValue::new("file.name", file_name.to_string()),
                KeyValue::new("file.original_size", payload.original_size as i64),
                KeyValue::new("file.compressed_size", payload.compressed_size as i64),
                KeyValue::new("file.compression_ratio", payload.compression_ratio),
                KeyValue::new("file.chunk_count", payload.chunk_count as i64),
            ],
            None,
        );
    }

    fn upload_started(&self, file_name: &str) {
        self.log.upload_started(file_name);
    }

    fn upload_finished(&self, file_name: &str, result: &UploadResult, elapsed: Duration) {
        self.log.upload_finished(file_name, result, elapsed);

        let mut attributes = vec![
            KeyValue::new("file.name", file_name.to_string()),
            KeyValue::new("upload.duration_ms", elapsed.as_secs_f64() * 1000.0),
        ];
        let error = match result {
            UploadResult::Ok(receipt) => {
                attributes.extend([
                    KeyValue::new("file.original_size", receipt.original_size as i64),
                    KeyValue::new("file.compressed_size", receipt.compressed_size as i64),
                    KeyValue::new("file.checksum_ok", receipt.checksum_ok),
                    KeyValue::new("predicate.is_large_file", receipt.is_large_file),
                    KeyValue::new("predicate.bug_triggered", receipt.bug_triggered),
                ]);
                None
            }
            UploadResult::Error { reason } => Some(reason.clone()),
        };

        self.export_span("handle_upload", elapsed, attributes, error);
    }
}

#[cfg(feature = "otlp")]
impl Drop for OtlpReporter {
    fn drop(&mut self) {
        // Flush batched spans before the runtime goes away
        let _ = self.provider.shutdown();
    }
}

// Stub implementation when OTLP feature is disabled
#[cfg(not(feature = "otlp"))]
pub struct OtlpReporter;

#[cfg(not(feature = "otlp"))]
impl OtlpReporter {
    pub fn new(_config: OtlpConfig) -> anyhow::Result<Self> {
        anyhow::bail!("OTLP support not compiled in. Enable the 'otlp' feature.");
    }
}

#[cfg(not(feature = "otlp"))]
impl Reporter for OtlpReporter {}
