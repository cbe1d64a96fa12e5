//! ptarchive command-line tool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ptarchive::{ArchiveRetriever, ArchiveSet, Config, Event, StreamOptions, TimeWindow, utils};

/// Download Papertrail log archives
#[derive(Parser)]
#[command(name = "ptarchive")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Archive API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every available archive
    Ls,

    /// Copy archives overlapping a time range to a local directory
    Cp(CpArgs),
}

#[derive(Args)]
struct CpArgs {
    /// Output directory (default: a new temporary directory)
    #[arg(short = 'o', long = "outdir")]
    outdir: Option<PathBuf>,

    /// Start of time range, RFC 3339 (default: one hour ago)
    #[arg(short = 's', long)]
    start: Option<String>,

    /// End of time range, RFC 3339 (default: now)
    #[arg(short = 'e', long)]
    end: Option<String>,

    /// Dry run lists archives that would be downloaded
    #[arg(short = 'd', long)]
    dry: bool,

    /// Number of concurrent downloads
    #[arg(short = 'w', long, default_value_t = 4)]
    workers: usize,

    /// Gunzip archives before writing them
    #[arg(short = 'z', long)]
    decompress: bool,

    /// Keep only lines containing this text (implies --decompress)
    #[arg(long)]
    grep: Option<String>,

    /// Keep only lines matching this regular expression (implies --decompress)
    #[arg(long)]
    regex: Option<String>,
}

impl CpArgs {
    fn window(&self) -> Result<TimeWindow> {
        let now = Utc::now();
        let end = time_arg("end", self.end.as_deref(), now)?;
        let start = time_arg("start", self.start.as_deref(), now - TimeDelta::hours(1))?;
        Ok(TimeWindow::new(start, end))
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            decompress: self.decompress,
            substring: self.grep.clone(),
            pattern: self.regex.clone(),
        }
    }
}

fn time_arg(key: &str, value: Option<&str>, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match value {
        Some(value) => Ok(utils::parse_timestamp(key, value)?),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    match cli.command {
        Commands::Ls => ls(config).await,
        Commands::Cp(args) => cp(config, args).await,
    }
}

async fn ls(config: Config) -> Result<ExitCode> {
    let retriever = ArchiveRetriever::from_config(config)?;
    let archives = retriever
        .list_archives()
        .await
        .context("failed to fetch archive list")?;

    for entry in retriever.dry_run(&archives)? {
        println!("{}\t{}", entry.name, entry.size);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cp(mut config: Config, args: CpArgs) -> Result<ExitCode> {
    let window = args.window()?;
    config.workers = args.workers;
    config.output_dir = args.outdir.clone();
    config.stream = args.stream_options();

    let retriever = ArchiveRetriever::from_config(config)?;
    let selected = retriever
        .select(&window)
        .await
        .context("failed to fetch archive list")?;

    if args.dry {
        println!("Dry run - these files would be downloaded...");
        let entries = retriever.dry_run(&selected)?;
        let total: u64 = entries.iter().map(|e| e.size).sum();
        for entry in &entries {
            println!("{}\t{}", entry.name, entry.size);
        }
        println!("{} archives, {} bytes", entries.len(), total);
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = retriever
        .output_dir()
        .context("failed to create output directory")?;
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(&retriever, &selected, &output_dir, event_rx);

    let summary = tokio::select! {
        summary = retriever.download_with_events(selected, &output_dir, event_tx) => summary?,
        _ = ptarchive::shutdown_signal() => {
            eprintln!("Interrupted, partial files may remain in {}", output_dir.display());
            return Ok(ExitCode::from(130));
        }
    };
    printer.await.ok();

    println!(
        "{} of {} archives saved to {}",
        summary.succeeded,
        summary.dispatched,
        output_dir.display()
    );

    if summary.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Print one `<path>: <outcome>` line per archive as workers finish
fn spawn_printer(
    retriever: &ArchiveRetriever,
    selected: &ArchiveSet,
    output_dir: &std::path::Path,
    mut events: mpsc::UnboundedReceiver<Event>,
) -> tokio::task::JoinHandle<()> {
    let paths: HashMap<String, PathBuf> = selected
        .iter()
        .map(|a| (a.filename.clone(), retriever.destination_for(output_dir, a)))
        .collect();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::ArchiveComplete { path, .. } => {
                    println!("{}: success", path.display());
                }
                Event::ArchiveFailed { name, error, .. } => {
                    let path = paths
                        .get(&name)
                        .map(|p| p.display().to_string())
                        .unwrap_or(name);
                    println!("{}: {}", path, error);
                }
                Event::RunFinished { .. } => break,
                Event::ArchiveStarted { .. } => {}
            }
        }
    })
}
