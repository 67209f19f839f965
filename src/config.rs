//! Configuration file for server, client, oracle and telemetry
//!
//! Every field has a default, so an empty TOML file (or no file) is valid.
//! CLI flags are applied on top by `main`.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//! workers = 8
//!
//! [oracle]
//! probability = 0.3
//! seed = 42
//!
//! [telemetry]
//! otlp_endpoint = "http://localhost:4317"
//! sampling = "0.2"
//! ```

use crate::codec::DEFAULT_CHUNK_SIZE;
use crate::error::{Result, TransferError};
use crate::oracle::OracleConfig;
use crate::writer_pool::DEFAULT_WORKERS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub oracle: OracleConfig,
    pub client: ClientConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Directory receiving uploaded payloads
    pub output_dir: PathBuf,
    /// Background writer threads
    pub workers: usize,
    /// Threads accepting HTTP requests
    pub request_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            output_dir: PathBuf::from("server_files"),
            workers: DEFAULT_WORKERS,
            request_threads: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Directory whose files are uploaded
    pub input_dir: PathBuf,
    /// Record log appended after each successful upload
    pub records: PathBuf,
    pub chunk_size: usize,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000/upload".to_string(),
            input_dir: PathBuf::from("client_files"),
            records: PathBuf::from("sd/sd_data.csv"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    /// "always_on" or a ratio in 0.0-1.0
    pub sampling: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            sampling: "always_on".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| TransferError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    TransferError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject values the server or client cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.oracle.probability) {
            return Err(TransferError::Config(format!(
                "oracle.probability must be within 0.0-1.0, got {}",
                self.oracle.probability
            )));
        }
        if self.client.chunk_size == 0 {
            return Err(TransferError::Config("client.chunk_size must be > 0".into()));
        }
        if self.server.workers == 0 {
            return Err(TransferError::Config("server.workers must be > 0".into()));
        }
        if self.server.request_threads == 0 {
            return Err(TransferError::Config(
                "server.request_threads must be > 0".into(),
            ));
        }
        Ok(())
    }
}
