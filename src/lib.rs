//! sdxfer - compressed file transfer with statistical fault localization
//!
//! This library provides the streaming gzip + SHA-256 codec, the upload
//! protocol with its server-side corruption oracle, the per-transfer record
//! log, and the statistical analyzer that ranks predicates by how strongly
//! they explain failed transfers.

pub mod analyzer;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod generate;
pub mod metrics;
pub mod oracle;
pub mod protocol;
pub mod record;
pub mod recorder;
pub mod server;
pub mod telemetry;
pub mod writer_pool;

pub use error::{Result, TransferError};
