use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use pydoc_status::cache::SqliteCache;
use pydoc_status::compare::ExpectedStatusTable;
use pydoc_status::fetcher::{FetchOptions, Fetcher, HttpTransport};
use pydoc_status::output::{control_output, OutputMode};
use pydoc_status::parser::extract::PageType;
use pydoc_status::pipeline;
use pydoc_status::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "pydoc_status", about = "Python documentation parser and status checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Clear the HTTP cache before running
    #[arg(short, long, global = true)]
    clear_cache: bool,

    /// Additional output methods (plain lines when omitted)
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputMode>,

    /// JSON file of identifier -> expected status (string or list of strings)
    #[arg(long, global = true)]
    expected: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check what's-new articles for each Python release
    WhatsNew {
        /// Max articles to check
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// List documented Python versions and their status
    LatestVersions,
    /// Download the PDF (A4) documentation archive
    Download,
    /// Compare every PEP's page status with the PEP index
    Pep {
        /// Max PEPs to check
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    // Flushes the file log when dropped at the end of main.
    let _log_guard = init_logging(&settings.logs_dir, settings.log_files_kept)?;

    info!("Parser started");
    info!("Command line arguments: {:?}", cli);

    let cache = Arc::new(SqliteCache::open(&settings.cache_path)?);
    let fetcher = Fetcher::new(
        HttpTransport::new(&settings)?,
        cache,
        FetchOptions::from_settings(&settings),
    );
    if cli.clear_cache {
        fetcher.clear_cache()?;
    }

    // Read before anything is fetched; an unreadable table ends the run.
    let expected = cli
        .expected
        .as_deref()
        .map(ExpectedStatusTable::from_json_file)
        .transpose()?;

    let (page_type, report) = match cli.command {
        Commands::Pep { limit } => (
            PageType::Pep,
            pipeline::peps(&fetcher, &settings, expected, limit).await?,
        ),
        Commands::WhatsNew { limit } => (
            PageType::WhatsNew,
            pipeline::whats_new(&fetcher, &settings, expected.unwrap_or_default(), limit).await?,
        ),
        Commands::LatestVersions => (
            PageType::VersionList,
            pipeline::latest_versions(&fetcher, &settings, expected.unwrap_or_default()).await?,
        ),
        Commands::Download => {
            let path = pipeline::download_archive(&fetcher, &settings).await?;
            println!("{}", path.display());
            finish(t0);
            return Ok(());
        }
    };

    control_output(&report, page_type, cli.output, &settings.results_dir)?;
    finish(t0);
    Ok(())
}

/// Log to stderr and to a daily-rotated `parser.log` under `logs_dir`.
fn init_logging(logs_dir: &Path, files_kept: usize) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("cannot create log directory {}", logs_dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("parser")
        .filename_suffix("log")
        .max_log_files(files_kept.max(1))
        .build(logs_dir)
        .context("cannot open log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

fn finish(t0: Instant) {
    let elapsed = t0.elapsed();
    info!("Parser finished in {}", format_duration(elapsed));
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
