use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sdxfer::analyzer;
use sdxfer::cli::{AnalyzeArgs, Cli, Command, GenerateArgs, OutputFormat, ServeArgs, UploadArgs};
use sdxfer::client::{HttpTransport, Uploader};
use sdxfer::config::AppConfig;
use sdxfer::generate;
use sdxfer::metrics::{MetricsReporter, Role, TransferMetrics};
use sdxfer::oracle::CorruptionOracle;
use sdxfer::protocol::UploadHandler;
use sdxfer::recorder::RecordLog;
use sdxfer::server::UploadServer;
use sdxfer::telemetry::{self, LogReporter, OtlpConfig, OtlpReporter, Reporter};
use sdxfer::writer_pool::WriterPool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises the default level to trace
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Pick the OTLP reporter when an endpoint is configured, else plain logging
fn build_reporter(
    endpoint: Option<&str>,
    sampling: &str,
    service: &str,
) -> Result<Arc<dyn Reporter>> {
    match endpoint {
        Some(endpoint) => {
            let reporter = OtlpReporter::new(OtlpConfig {
                endpoint: endpoint.to_string(),
                service_name: service.to_string(),
                sample_ratio: telemetry::parse_sampling(sampling),
            })?;
            Ok(Arc::new(reporter))
        }
        None => Ok(Arc::new(LogReporter)),
    }
}

fn run_serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = args.output_dir {
        config.server.output_dir = dir;
    }
    if let Some(workers) = args.workers {
        config.server.workers = workers;
    }
    if let Some(p) = args.probability {
        if !(0.0..=1.0).contains(&p) {
            anyhow::bail!("Invalid value for --probability: {} (must be within 0.0-1.0)", p);
        }
        config.oracle.probability = p;
    }
    if let Some(seed) = args.seed {
        config.oracle.seed = Some(seed);
    }
    if args.no_bug {
        config.oracle.enabled = false;
    }
    if let Some(endpoint) = args.otlp_endpoint {
        config.telemetry.otlp_endpoint = Some(endpoint);
    }
    if let Some(sampling) = args.sampling {
        config.telemetry.sampling = sampling;
    }
    config.validate()?;

    let reporter = build_reporter(
        config.telemetry.otlp_endpoint.as_deref(),
        &config.telemetry.sampling,
        "sdxfer-server",
    )?;
    let metrics = TransferMetrics::new()?;
    let reporter: Arc<dyn Reporter> =
        Arc::new(MetricsReporter::new(reporter, metrics.clone(), Role::Server));
    let pool = WriterPool::new(&config.server.output_dir, config.server.workers)
        .with_context(|| {
            format!(
                "cannot prepare output directory {}",
                config.server.output_dir.display()
            )
        })?;

    tracing::info!(
        enabled = config.oracle.enabled,
        probability = config.oracle.probability,
        threshold_bytes = config.oracle.threshold_bytes,
        seed = ?config.oracle.seed,
        "corruption oracle configured"
    );
    let oracle = CorruptionOracle::new(config.oracle.clone());
    let handler = Arc::new(UploadHandler::new(oracle, Arc::new(pool), reporter));

    let server = UploadServer::start(
        &config.server.bind,
        config.server.request_threads,
        handler,
        Some(metrics),
    )
    .map_err(anyhow::Error::msg)?;
    println!("Listening on http://{}", server.addr());
    server.join();
    Ok(())
}

fn run_upload(mut config: AppConfig, args: UploadArgs) -> Result<()> {
    if let Some(url) = args.server_url {
        config.client.server_url = url;
    }
    if let Some(dir) = args.input_dir {
        config.client.input_dir = dir;
    }
    if let Some(records) = args.records {
        config.client.records = records;
    }
    if let Some(chunk_size) = args.chunk_size {
        if chunk_size == 0 {
            anyhow::bail!("Invalid value for --chunk-size: 0 (must be > 0)");
        }
        config.client.chunk_size = chunk_size;
    }
    if let Some(endpoint) = args.otlp_endpoint {
        config.telemetry.otlp_endpoint = Some(endpoint);
    }
    config.validate()?;

    let reporter = build_reporter(
        config.telemetry.otlp_endpoint.as_deref(),
        &config.telemetry.sampling,
        "sdxfer-client",
    )?;
    let metrics = TransferMetrics::new()?;
    let reporter: Arc<dyn Reporter> =
        Arc::new(MetricsReporter::new(reporter, metrics.clone(), Role::Client));
    let transport = HttpTransport::new(
        config.client.server_url.clone(),
        Duration::from_secs(config.client.timeout_secs),
    )?;
    let uploader = Uploader::new(transport, RecordLog::new(&config.client.records))
        .with_chunk_size(config.client.chunk_size)
        .with_reporter(reporter);

    let summary = uploader.send_dir(&config.client.input_dir)?;
    let corrupted = summary.records.iter().filter(|r| r.failed).count();
    println!(
        "Uploaded {} file(s), {} failed, {} checksum mismatch(es). Records: {}",
        summary.sent,
        summary.failed,
        corrupted,
        uploader.log().path().display()
    );
    if let Some(path) = args.metrics_file {
        std::fs::write(&path, metrics.render()?)
            .with_context(|| format!("cannot write metrics to {}", path.display()))?;
    }
    Ok(())
}

fn run_analyze(config: AppConfig, args: AnalyzeArgs) -> Result<()> {
    let path = args.records.unwrap_or(config.client.records);
    let records = RecordLog::new(&path)
        .load()
        .with_context(|| format!("cannot load records from {}", path.display()))?;

    let analysis = analyzer::analyze(&records);
    match args.format {
        OutputFormat::Text => print!("{}", analysis.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
    }
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let written = generate::generate(&args.dir, args.max_size, &mut rng)?;
    println!("Generated {} file(s) in {}", written.len(), args.dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve(cmd) => run_serve(config, cmd),
        Command::Upload(cmd) => run_upload(config, cmd),
        Command::Analyze(cmd) => run_analyze(config, cmd),
        Command::Generate(cmd) => run_generate(cmd),
    }
}
