use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tsexport::{Collector, ExporterConfig, WhenExhausted};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ExhaustedPolicy {
    Block,
    Fail,
}

impl From<ExhaustedPolicy> for WhenExhausted {
    fn from(v: ExhaustedPolicy) -> Self {
        match v {
            ExhaustedPolicy::Block => WhenExhausted::Block,
            ExhaustedPolicy::Fail => WhenExhausted::Fail,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "tsexport-server",
    version,
    about = "Receives Prometheus remote writes and exports them as gzipped JSON-lines batches"
)]
struct Args {
    /// YAML configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prefix of every exported file name
    #[arg(long)]
    app: Option<String>,

    /// Directory batch files are written to (must exist)
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:1234
    #[arg(long)]
    listen: Option<String>,

    /// Maximum number of concurrent writers
    #[arg(long)]
    max_total: Option<usize>,

    /// Records per file before a commit
    #[arg(long)]
    commit_batch_size: Option<usize>,

    /// Idle milliseconds before an open file is committed
    #[arg(long)]
    max_commit_interval_ms: Option<u64>,

    /// What a request does when every writer is busy
    #[arg(long, value_enum)]
    when_exhausted: Option<ExhaustedPolicy>,

    /// Bound on waiting for a writer when blocking
    #[arg(long)]
    max_wait_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ExporterConfig, tsexport::ExportError> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::from_path(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(app) = self.app {
            config.app = app;
        }
        if let Some(dir) = self.export_dir {
            config.export_directory = dir;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(max_total) = self.max_total {
            config.max_total = max_total;
        }
        if let Some(size) = self.commit_batch_size {
            config.commit_batch_size = size;
        }
        if let Some(interval) = self.max_commit_interval_ms {
            config.max_commit_interval_ms = interval;
        }
        if let Some(policy) = self.when_exhausted {
            config.when_exhausted = policy.into();
        }
        if let Some(wait) = self.max_wait_ms {
            config.max_wait_ms = Some(wait);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tsexport::telemetry::init();

    let args = Args::parse();
    let config = args.into_config()?;

    let collector = match Collector::start(config) {
        Ok(collector) => collector,
        Err(e) => {
            tracing::error!("Failed to start collector: {e}");
            return Err(e.into());
        }
    };
    let recovery = collector.recovery_report();
    tracing::info!(
        compressed = recovery.compressed,
        removed = recovery.removed_temporaries + recovery.removed_empty + recovery.removed_published,
        failed = recovery.failed,
        last_writer_id = recovery.last_writer_id,
        "Startup recovery finished"
    );

    tsexport_http::start_server(collector).await
}
