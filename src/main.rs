//! Direct Uploadr - upload files to object storage through pre-signed URLs
//!
//! Asks a signing endpoint for a signed URL per file, then PUTs the file
//! directly to storage.

use anyhow::Context;
use clap::Parser;
use direct_uploadr::config::UploaderOptions;
use direct_uploadr::upload::{FlowOutcome, S3Uploader, UploadFile};
use direct_uploadr::{metrics, selection};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Direct Uploadr - upload files straight to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "direct-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an uploader options file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the application serving the signing endpoint
    #[arg(short, long)]
    server: Option<String>,

    /// Signing endpoint path
    #[arg(long)]
    signing_url: Option<String>,

    /// Storage path prefix sent to the signing endpoint
    #[arg(long)]
    s3path: Option<String>,

    /// Content-Disposition policy ("auto" or a literal value)
    #[arg(long)]
    content_disposition: Option<String>,

    /// Accepted file types, e.g. "image/*,.pdf"
    #[arg(long)]
    accept: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the uploads finish
    #[arg(long)]
    print_metrics: bool,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Args {
    fn cli_options(&self) -> UploaderOptions {
        UploaderOptions {
            server: self.server.clone(),
            signing_url: self.signing_url.clone(),
            s3path: self.s3path.clone(),
            content_disposition: self.content_disposition.clone().map(Into::into),
            accept: self.accept.clone(),
            ..UploaderOptions::default()
        }
    }
}

fn init_logging(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json)?;

    info!("Starting Direct Uploadr v{}", env!("CARGO_PKG_VERSION"));

    let mut options = match &args.config {
        Some(path) => {
            let options = UploaderOptions::load(path)
                .with_context(|| format!("loading options from {:?}", path))?;
            info!("Loaded options from {:?}", path);
            options
        }
        None => UploaderOptions::default(),
    };
    options = options.merge(args.cli_options());

    let accept = options.accept.clone();
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("reading {:?}", path))?;
        if selection::accepts(accept.as_deref(), &file) {
            files.push(file);
        } else {
            warn!(file = %file.name, accept = ?accept, "Skipping file not matching accept list");
        }
    }

    let uploader = S3Uploader::new(options)?;
    let batch = uploader.handle(files);
    info!(files = batch.len(), "Uploads started");

    let abort_target = uploader.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting the current transfer");
            abort_target.abort_upload();
        }
    });

    let outcomes = batch.join().await;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    for outcome in &outcomes {
        if let FlowOutcome::Finished(result) = outcome {
            if let Some(url) = result.public_url() {
                println!("{}", url);
            }
        }
    }

    if args.print_metrics {
        print!("{}", metrics::render());
    }

    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, outcomes.len());
    }

    Ok(())
}
