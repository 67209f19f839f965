//! Upload client: codec pass, one request per file, one record per success
//!
//! Strictly sequential: a file is compressed, sent and logged before the next
//! one is opened. The client never re-verifies what the server stored; it
//! records the server's own report of `checksum_ok`, `is_large_file` and
//! `bug_triggered`.

use crate::codec;
use crate::error::{Result, TransferError};
use crate::protocol::{UploadHandler, UploadMetadata, UploadQuery, UploadResult};
use crate::record::TransferRecord;
use crate::recorder::RecordLog;
use crate::telemetry::{NoopReporter, Reporter};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Moves one compressed payload to a server and returns its verdict
pub trait UploadTransport {
    fn upload(&self, metadata: &UploadMetadata, body: Vec<u8>) -> Result<UploadResult>;
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl UploadTransport for HttpTransport {
    fn upload(&self, metadata: &UploadMetadata, body: Vec<u8>) -> Result<UploadResult> {
        let response = self
            .client
            .post(&self.url)
            .query(&metadata.query_pairs())
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        match serde_json::from_str::<UploadResult>(&text) {
            Ok(result) => Ok(result),
            Err(_) => Err(TransferError::UnexpectedResponse {
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}

/// In-process transport that calls an [`UploadHandler`] directly
pub struct LocalTransport<R = rand::rngs::StdRng> {
    handler: Arc<UploadHandler<R>>,
}

impl<R: RngCore> LocalTransport<R> {
    pub fn new(handler: Arc<UploadHandler<R>>) -> Self {
        Self { handler }
    }
}

impl<R: RngCore> UploadTransport for LocalTransport<R> {
    fn upload(&self, metadata: &UploadMetadata, body: Vec<u8>) -> Result<UploadResult> {
        Ok(self.handler.handle(&UploadQuery::from(metadata), &body[..]))
    }
}

/// Totals for one directory run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub sent: usize,
    pub failed: usize,
    pub records: Vec<TransferRecord>,
}

/// Sequential uploader writing the record log
pub struct Uploader<T> {
    transport: T,
    log: RecordLog,
    chunk_size: usize,
    reporter: Arc<dyn Reporter>,
}

impl<T: UploadTransport> Uploader<T> {
    pub fn new(transport: T, log: RecordLog) -> Self {
        Self {
            transport,
            log,
            chunk_size: codec::DEFAULT_CHUNK_SIZE,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    /// Compress, upload and record one file
    ///
    /// A `status=error` answer becomes [`TransferError::Rejected`] and no
    /// record is written.
    pub fn send_file(&self, path: &Path) -> Result<TransferRecord> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.reporter.codec_started(&name);
        let codec_start = Instant::now();
        let payload = codec::compress_file(path, self.chunk_size)?;
        self.reporter.codec_finished(&name, &payload, codec_start.elapsed());

        tracing::info!(
            file = %name,
            original_size = payload.original_size,
            compressed_size = payload.compressed_size,
            ratio = payload.compression_ratio,
            chunks = payload.chunk_count,
            "sending file"
        );

        let metadata = UploadMetadata::for_payload(&name, &payload);
        let original_size = payload.original_size;
        let compressed_size = payload.compressed_size;

        self.reporter.upload_started(&name);
        let start = Instant::now();
        let outcome = self.transport.upload(&metadata, payload.compressed);
        let elapsed = start.elapsed();
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                let failed = UploadResult::Error {
                    reason: e.to_string(),
                };
                self.reporter.upload_finished(&name, &failed, elapsed);
                return Err(e);
            }
        };
        self.reporter.upload_finished(&name, &result, elapsed);

        let receipt = match result {
            UploadResult::Ok(receipt) => receipt,
            UploadResult::Error { reason } => return Err(TransferError::Rejected { reason }),
        };
        tracing::debug!(file = %name, receipt = ?receipt, "server response");

        let record = TransferRecord::from_receipt(
            name,
            original_size,
            compressed_size,
            elapsed.as_secs_f64() * 1000.0,
            &receipt,
        );
        self.log.append(&record)?;
        Ok(record)
    }

    /// Upload every regular file in `dir`, in name order
    ///
    /// A file that fails is logged and counted; the run moves on.
    pub fn send_dir(&self, dir: &Path) -> Result<UploadSummary> {
        let files = list_files(dir)?;
        let mut summary = UploadSummary::default();

        if files.is_empty() {
            tracing::warn!(dir = %dir.display(), "no files to upload");
            return Ok(summary);
        }

        for path in files {
            match self.send_file(&path) {
                Ok(record) => {
                    summary.sent += 1;
                    summary.records.push(record);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(file = %path.display(), error = %e, "upload failed");
                }
            }
        }
        Ok(summary)
    }
}

/// Regular files directly inside `dir`, sorted by path
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input directory does not exist: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsReporter, Role, TransferMetrics};
    use crate::protocol::UploadReceipt;
    use std::cell::RefCell;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Transport returning canned answers and remembering requests
    struct Scripted {
        answers: RefCell<Vec<UploadResult>>,
        seen: RefCell<Vec<UploadMetadata>>,
    }

    impl UploadTransport for Scripted {
        fn upload(&self, metadata: &UploadMetadata, _body: Vec<u8>) -> Result<UploadResult> {
            self.seen.borrow_mut().push(metadata.clone());
            Ok(self.answers.borrow_mut().remove(0))
        }
    }

    fn receipt(name: &str, checksum_ok: bool) -> UploadResult {
        UploadResult::Ok(UploadReceipt {
            filename: name.into(),
            checksum_ok,
            server_checksum: "00".into(),
            compression_ratio: None,
            original_size: 5,
            compressed_size: 25,
            is_large_file: true,
            bug_triggered: !checksum_ok,
        })
    }

    #[test]
    fn test_send_file_records_server_report() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let transport = Scripted {
            answers: RefCell::new(vec![receipt("a.txt", false)]),
            seen: RefCell::new(Vec::new()),
        };
        let uploader = Uploader::new(transport, RecordLog::new(dir.path().join("log.csv")));
        let record = uploader.send_file(&file).unwrap();

        assert_eq!(record.file_name, "a.txt");
        assert_eq!(record.original_size, 5);
        assert!(record.is_large_file);
        assert!(record.bug_triggered);
        assert!(record.failed);

        let seen = uploader.transport.seen.borrow();
        assert_eq!(seen[0].checksum, codec::sha256_hex(b"hello"));
        let logged = uploader.log().load().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].file_name, record.file_name);
        assert_eq!(logged[0].compression_ratio, record.compression_ratio);
        assert!(logged[0].failed);
    }

    #[test]
    fn test_rejected_upload_writes_no_record() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let transport = Scripted {
            answers: RefCell::new(vec![UploadResult::Error {
                reason: "missing metadata".into(),
            }]),
            seen: RefCell::new(Vec::new()),
        };
        let log_path = dir.path().join("log.csv");
        let uploader = Uploader::new(transport, RecordLog::new(&log_path));

        let result = uploader.send_file(&file);
        assert!(matches!(result, Err(TransferError::Rejected { .. })));
        assert!(!log_path.exists());
    }

    #[test]
    fn test_send_dir_sorted_and_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();
        fs::create_dir(input.join("nested")).unwrap();
        for name in ["c.bin", "a.bin", "b.bin"] {
            fs::write(input.join(name), name.as_bytes()).unwrap();
        }

        let transport = Scripted {
            answers: RefCell::new(vec![
                receipt("a.bin", true),
                UploadResult::Error {
                    reason: "boom".into(),
                },
                receipt("c.bin", true),
            ]),
            seen: RefCell::new(Vec::new()),
        };
        let uploader = Uploader::new(transport, RecordLog::new(dir.path().join("log.csv")));
        let summary = uploader.send_dir(&input).unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);
        let names: Vec<_> = uploader
            .transport
            .seen
            .borrow()
            .iter()
            .map(|m| m.filename.clone())
            .collect();
        assert_eq!(names, vec!["a.bin", "b.bin", "c.bin"]);
        assert_eq!(uploader.log().load().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_input_dir_errors() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(&dir.path().join("nope")).is_err());
    }

    struct Unreachable;

    impl UploadTransport for Unreachable {
        fn upload(&self, _metadata: &UploadMetadata, _body: Vec<u8>) -> Result<UploadResult> {
            Err(TransferError::UnexpectedResponse {
                status: 502,
                body: "bad gateway".into(),
            })
        }
    }

    #[derive(Default)]
    struct Hooks(Mutex<Vec<String>>);

    impl Reporter for Hooks {
        fn upload_started(&self, file_name: &str) {
            self.0.lock().unwrap().push(format!("start {}", file_name));
        }

        fn upload_finished(&self, file_name: &str, result: &UploadResult, _elapsed: Duration) {
            self.0
                .lock()
                .unwrap()
                .push(format!("finish {} ok={}", file_name, result.is_ok()));
        }
    }

    #[test]
    fn test_transport_error_still_closes_upload_hooks() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let hooks = Arc::new(Hooks::default());
        let uploader = Uploader::new(Unreachable, RecordLog::new(dir.path().join("log.csv")))
            .with_reporter(hooks.clone());

        let result = uploader.send_file(&file);
        assert!(matches!(
            result,
            Err(TransferError::UnexpectedResponse { status: 502, .. })
        ));
        assert_eq!(
            *hooks.0.lock().unwrap(),
            vec!["start a.txt".to_string(), "finish a.txt ok=false".to_string()]
        );
    }

    #[test]
    fn test_client_metrics_count_failed_transport() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let metrics = TransferMetrics::new().unwrap();
        let reporter = MetricsReporter::new(Arc::new(NoopReporter), metrics.clone(), Role::Client);
        let uploader = Uploader::new(Unreachable, RecordLog::new(dir.path().join("log.csv")))
            .with_reporter(Arc::new(reporter));

        assert!(uploader.send_file(&file).is_err());
        assert_eq!(metrics.files_sent_total.with_label_values(&["false"]).get(), 1);
        assert_eq!(metrics.files_sent_total.with_label_values(&["true"]).get(), 0);
    }
}
