//! Fire-and-forget background writes for uploaded payloads
//!
//! The request path hands each verified payload to a fixed set of worker
//! threads and returns immediately. Durability is at-most-eventual: a client
//! holding `status=ok` cannot assume the file is on disk yet, and writes still
//! queued when the process exits are lost.
//!
//! ```text
//! request thread ──schedule()──▶ crossbeam channel ──▶ worker 0..N ──▶ disk
//!      (returns at once)                                 (failures logged)
//! ```

use crossbeam::channel::{self, Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Default number of writer threads
pub const DEFAULT_WORKERS: usize = 8;

/// Destination for verified payloads
pub trait PayloadSink: Send + Sync {
    /// Queue `payload` for storage under `file_name` without waiting
    fn schedule(&self, file_name: &str, payload: Vec<u8>);
}

/// Sink that drops every payload
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl PayloadSink for DiscardSink {
    fn schedule(&self, _file_name: &str, _payload: Vec<u8>) {}
}

struct WriteJob {
    dest: PathBuf,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Fixed-size pool of disk writer threads
pub struct WriterPool {
    output_dir: PathBuf,
    sender: Mutex<Option<Sender<WriteJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WriterPool {
    /// Spawn `workers` writer threads targeting `output_dir`
    ///
    /// # Panics
    ///
    /// Panics if `workers` is 0.
    pub fn new(output_dir: impl Into<PathBuf>, workers: usize) -> std::io::Result<Self> {
        assert!(workers > 0, "Writer pool needs at least one worker");

        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;

        let (sender, receiver) = channel::unbounded::<WriteJob>();
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = receiver.clone();
            let counters = counters.clone();
            let handle = thread::Builder::new()
                .name(format!("sdxfer-writer-{}", id))
                .spawn(move || Self::worker(receiver, counters))?;
            handles.push(handle);
        }

        Ok(Self {
            output_dir,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Snapshot of the write counters (diagnostics only)
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work, drain the queue and join the workers
    pub fn shutdown(&self) -> PoolStats {
        self.lock_sender().take();

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.stats()
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<Sender<WriteJob>>> {
        self.sender.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn worker(receiver: Receiver<WriteJob>, counters: Arc<Counters>) {
        for job in receiver.iter() {
            match fs::write(&job.dest, &job.payload) {
                Ok(()) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(path = %job.dest.display(), bytes = job.payload.len(), "payload written");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(path = %job.dest.display(), error = %e, "background write failed");
                }
            }
        }
    }
}

impl PayloadSink for WriterPool {
    fn schedule(&self, file_name: &str, payload: Vec<u8>) {
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);

        let Some(name) = Path::new(file_name).file_name() else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(file = %file_name, "no usable file name, payload not persisted");
            return;
        };
        let job = WriteJob {
            dest: self.output_dir.join(name),
            payload,
        };

        let sent = match self.lock_sender().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(file = %file_name, "writer pool shut down, payload dropped");
        }
    }
}

impl Drop for WriterPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Writer pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub scheduled: u64,
    pub written: u64,
    pub failed: u64,
}

impl PoolStats {
    /// Jobs neither written nor failed yet
    pub fn pending(&self) -> u64 {
        self.scheduled.saturating_sub(self.written + self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pool_creation() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(dir.path().join("out"), 2).unwrap();
        assert!(pool.output_dir().is_dir());
        assert_eq!(
            pool.stats(),
            PoolStats {
                scheduled: 0,
                written: 0,
                failed: 0
            }
        );
    }

    #[test]
    #[should_panic(expected = "Writer pool needs at least one worker")]
    fn test_zero_workers_panics() {
        let dir = TempDir::new().unwrap();
        let _ = WriterPool::new(dir.path(), 0);
    }

    #[test]
    fn test_scheduled_writes_land_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(dir.path(), DEFAULT_WORKERS).unwrap();
        for i in 0..20 {
            pool.schedule(&format!("f{}.bin", i), vec![i as u8; 100]);
        }
        let stats = pool.shutdown();
        assert_eq!(stats.scheduled, 20);
        assert_eq!(stats.written, 20);
        assert_eq!(stats.pending(), 0);
        assert_eq!(fs::read(dir.path().join("f7.bin")).unwrap(), vec![7u8; 100]);
    }

    #[test]
    fn test_path_components_stripped() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(dir.path().join("out"), 1).unwrap();
        pool.schedule("../../escape.bin", b"x".to_vec());
        pool.shutdown();
        assert!(dir.path().join("out").join("escape.bin").exists());
        assert!(!dir.path().join("escape.bin").exists());
    }

    #[test]
    fn test_unusable_name_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(dir.path(), 1).unwrap();
        pool.schedule("..", b"x".to_vec());
        let stats = pool.shutdown();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 0);
    }

    #[test]
    fn test_schedule_after_shutdown_is_dropped() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(dir.path(), 1).unwrap();
        pool.shutdown();
        pool.schedule("late.bin", b"x".to_vec());
        assert_eq!(pool.stats().failed, 1);
        assert!(!dir.path().join("late.bin").exists());
    }
}
