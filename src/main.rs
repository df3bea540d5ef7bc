//! CLI entry point for the comprobantes tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use comprobantes_core::{
    Document, DownloadJobExecutor, FileTrigger, Harvester, HtmlSnapshotPage, KeyValueStore,
    MemoryStore, PaginationDriver, QueueConfig, QueueProgress, RunOutcome, ScanOptions,
    SqliteStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::cookie::Jar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::{Args, Command, DownloadArgs, ScanArgs};

/// Exit status when the portal session was lost mid-download.
const EXIT_SESSION_LOST: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load(args.config.as_deref())?;
    match args.command {
        Command::Scan(scan) => run_scan(scan, &file_config, args.quiet).await,
        Command::Download(download) => run_download(download, &file_config, args.quiet).await,
    }
}

async fn run_scan(args: ScanArgs, file: &FileConfig, quiet: bool) -> Result<ExitCode> {
    let pages = read_pages(&args.pages)?;
    let page = Arc::new(
        HtmlSnapshotPage::from_html(&pages).context("Failed to parse captured portal pages")?,
    );
    let store = open_store(args.store.as_deref().or(file.store.as_deref())).await?;

    // Captured pages need no render time.
    let settle = Duration::from_millis(args.settle_delay.or(file.settle_delay_ms).unwrap_or(0));
    let options = ScanOptions {
        optimize_pagination: args.optimize || file.optimize_pagination.unwrap_or(false),
        settle_delay: settle,
        repaginate_settle_delay: settle,
        ..ScanOptions::default()
    };

    let driver = PaginationDriver::new(page, store);
    let status = spinner(quiet);
    let mut progress = driver.subscribe();
    let progress_spinner = status.clone();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let message = progress.borrow().message.clone();
            progress_spinner.set_message(message);
        }
    });

    let report = driver.scan_all_pages(&options).await?;
    status.finish_and_clear();

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&report.documents)?;
        fs::write(output, json)
            .with_context(|| format!("Failed to write documents to '{}'", output.display()))?;
        info!(path = %output.display(), "documents written");
    }

    let kind = report
        .table_kind
        .map_or_else(|| "unknown".to_string(), |k| k.to_string());
    println!(
        "Scanned {} of {} pages ({kind} table): {} documents, {} rows dropped{}",
        report.pages_processed,
        report.total_pages,
        report.documents.len(),
        report.dropped_rows,
        if report.optimization_applied {
            ", page size enlarged"
        } else {
            ""
        }
    );

    match &report.error {
        Some(error) => {
            eprintln!("Scan stopped early: {error}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn run_download(args: DownloadArgs, file: &FileConfig, quiet: bool) -> Result<ExitCode> {
    let page_html = fs::read_to_string(&args.page)
        .with_context(|| format!("Failed to read page '{}'", args.page.display()))?;
    let page = Arc::new(
        HtmlSnapshotPage::from_html(&[page_html]).context("Failed to parse captured portal page")?,
    );
    let store = open_store(args.store.as_deref().or(file.store.as_deref())).await?;

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let cookie_jar = args
        .cookie
        .as_deref()
        .map(|cookie| cookie_jar(cookie, &args.endpoint))
        .transpose()?;
    let executor = DownloadJobExecutor::new(
        &args.endpoint,
        Arc::new(FileTrigger::new(&output_dir)),
        CancellationToken::new(),
        cookie_jar,
    )?;

    let harvester = Arc::new(
        Harvester::new(page, store, executor).with_queue_config(queue_config(&args, file)?),
    );

    let cancel_handle = Arc::clone(&harvester);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing the current batch");
            cancel_handle.cancel_download().await;
        }
    });

    let bar = progress_bar(quiet);
    let listener_bar = bar.clone();
    let on_progress = move |progress: &QueueProgress| update_bar(&listener_bar, progress);

    let summary = if args.resume {
        let Some(summary) = harvester.resume_download(on_progress).await? else {
            bar.finish_and_clear();
            println!("Nothing to resume");
            return Ok(ExitCode::SUCCESS);
        };
        summary
    } else {
        let path = args
            .documents
            .as_deref()
            .context("--documents is required without --resume")?;
        let documents = select_documents(load_documents(path)?, &args.ids);
        info!(documents = documents.len(), format = %args.format, "starting download");
        harvester
            .download_selected(documents, args.format, on_progress)
            .await?
    };
    bar.finish_and_clear();

    println!(
        "Downloaded {} of {} documents: {} failed, {} skipped, {} not attempted",
        summary.completed, summary.total, summary.failed, summary.skipped, summary.not_attempted
    );

    match summary.outcome {
        RunOutcome::SessionLost => {
            eprintln!(
                "Session lost: {}",
                summary
                    .session_lost_reason
                    .as_deref()
                    .unwrap_or("sign in to the portal again")
            );
            eprintln!("Run again with --resume after refreshing the page and cookie");
            Ok(ExitCode::from(EXIT_SESSION_LOST))
        }
        RunOutcome::Cancelled | RunOutcome::Paused => {
            eprintln!("Download stopped; run again with --resume to continue");
            Ok(ExitCode::FAILURE)
        }
        RunOutcome::Finished if summary.failed > 0 => Ok(ExitCode::FAILURE),
        RunOutcome::Finished => Ok(ExitCode::SUCCESS),
    }
}

fn read_pages(paths: &[PathBuf]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read page '{}'", path.display()))
        })
        .collect()
}

async fn open_store(path: Option<&Path>) -> Result<Arc<dyn KeyValueStore>> {
    match path {
        Some(path) => {
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("Failed to open store '{}'", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse documents '{}'", path.display()))
}

fn select_documents(documents: Vec<Document>, ids: &[String]) -> Vec<Document> {
    if ids.is_empty() {
        return documents;
    }
    documents
        .into_iter()
        .filter(|doc| ids.iter().any(|id| *id == doc.id))
        .collect()
}

/// Builds a jar holding each `name=value` pair of a cookie header.
fn cookie_jar(header: &str, endpoint: &str) -> Result<Arc<Jar>> {
    let url = url::Url::parse(endpoint)
        .with_context(|| format!("Invalid portal endpoint '{endpoint}'"))?;
    let jar = Jar::default();
    for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        jar.add_cookie_str(pair, &url);
    }
    Ok(Arc::new(jar))
}

fn queue_config(args: &DownloadArgs, file: &FileConfig) -> Result<QueueConfig> {
    let defaults = QueueConfig::default();
    let config = QueueConfig {
        batch_size: args
            .batch_size
            .and_then(|v| usize::try_from(v).ok())
            .or(file.batch_size)
            .unwrap_or(defaults.batch_size),
        concurrency: args
            .concurrency
            .and_then(|v| usize::try_from(v).ok())
            .or(file.concurrency)
            .unwrap_or(defaults.concurrency),
        max_retries: args
            .max_retries
            .or(file.max_retries)
            .unwrap_or(defaults.max_retries),
        retry_delay: file
            .retry_delay_ms
            .map_or(defaults.retry_delay, Duration::from_millis),
        delay_between_batches: file
            .delay_between_batches_ms
            .map_or(defaults.delay_between_batches, Duration::from_millis),
        progress_save_interval: file
            .progress_save_interval
            .unwrap_or(defaults.progress_save_interval),
        ..defaults
    };
    config.validate()?;
    Ok(config)
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} documents {msg}")
    {
        bar.set_style(style);
    }
    bar
}

fn update_bar(bar: &ProgressBar, progress: &QueueProgress) {
    bar.set_length(progress.total() as u64);
    bar.set_position((progress.completed_docs + progress.failed_docs) as u64);
    let eta = progress
        .estimated_time_remaining
        .map_or_else(String::new, |secs| format!(", ~{secs:.0}s left"));
    bar.set_message(format!(
        "batch {}/{} ({:.1}/min{eta})",
        progress.current_batch, progress.total_batches, progress.current_speed
    ));
}
