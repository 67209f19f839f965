//! CLI argument parsing for sdxfer

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analyzer results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "sdxfer")]
#[command(version)]
#[command(
    about = "Compressed file transfer with statistical debugging of injected corruption",
    long_about = None
)]
pub struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the upload server
    Serve(ServeArgs),
    /// Upload every file in a directory and append one record per success
    Upload(UploadArgs),
    /// Rank predicates from the record log
    Analyze(AnalyzeArgs),
    /// Write the synthetic client file set
    Generate(GenerateArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address (e.g., 0.0.0.0:8000)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Directory receiving uploaded payloads
    #[arg(short, long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of background writer threads
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Seed for the corruption oracle (reproducible runs)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Corruption probability for large files (0.0-1.0)
    #[arg(long, value_name = "P")]
    pub probability: Option<f64>,

    /// Disable corruption injection entirely
    #[arg(long = "no-bug")]
    pub no_bug: bool,

    /// Export spans to this OTLP endpoint (e.g., http://localhost:4317)
    #[arg(long = "otlp-endpoint", value_name = "URL")]
    pub otlp_endpoint: Option<String>,

    /// Trace sampling: "always_on" or a ratio in 0.0-1.0
    #[arg(long, value_name = "SAMPLING")]
    pub sampling: Option<String>,
}

#[derive(clap::Args, Debug, Default)]
pub struct UploadArgs {
    /// Upload endpoint URL
    #[arg(short = 'u', long = "server-url", value_name = "URL")]
    pub server_url: Option<String>,

    /// Directory whose regular files are uploaded
    #[arg(short, long = "input-dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Record log to append to
    #[arg(short, long, value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// Read chunk size in bytes for the codec pass
    #[arg(long = "chunk-size", value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Export spans to this OTLP endpoint
    #[arg(long = "otlp-endpoint", value_name = "URL")]
    pub otlp_endpoint: Option<String>,

    /// Write client metrics in Prometheus text format after the run
    #[arg(long = "metrics-file", value_name = "FILE")]
    pub metrics_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Record log to analyze
    #[arg(short, long, value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Target directory
    #[arg(short, long, value_name = "DIR", default_value = "client_files")]
    pub dir: PathBuf,

    /// RNG seed for reproducible content
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Skip files larger than this many bytes
    #[arg(long = "max-size", value_name = "BYTES")]
    pub max_size: Option<u64>,
}
