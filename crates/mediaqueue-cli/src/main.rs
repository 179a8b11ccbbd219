//! Mediaqueue CLI - queued image and video generation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use mediaqueue_core::archive::{self, ExportReport};
use mediaqueue_core::config::Config;
use mediaqueue_core::credentials::Credentials;
use mediaqueue_core::jobs::{
    ImageModel, Job, JobEvent, JobId, JobPayload, JobQueue, JobStats, JobStatus, JobType, NewJob,
    QueueOptions,
};
use mediaqueue_core::media::MediaData;
use mediaqueue_core::providers::ProviderRouter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mediaqueue")]
#[command(author, version, about = "Queued AI image and video generation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images from text prompts
    TextToImage {
        /// One job per prompt
        #[arg(required = true)]
        prompts: Vec<String>,
        /// Jobs to queue for each prompt
        #[arg(short = 'n', long, default_value_t = 1, value_parser = parse_count)]
        count: usize,
        #[command(flatten)]
        image: ImageArgs,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Restyle existing images with a prompt
    Remix {
        /// Input images
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(short, long)]
        prompt: String,
        /// Jobs to queue for each image
        #[arg(short = 'n', long, default_value_t = 1, value_parser = parse_count)]
        count: usize,
        #[command(flatten)]
        image: ImageArgs,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Remove the background from images
    RemoveBg {
        /// Input images
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Generate a video from a prompt, an image, or both
    Video {
        #[arg(short, long)]
        prompt: Option<String>,
        /// Starting frame
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// 16:9 or 9:16
        #[arg(long)]
        aspect_ratio: Option<String>,
        /// 720p or 1080p
        #[arg(long)]
        resolution: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Run jobs listed in a JSON or TOML file
    Batch {
        file: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Show which provider API keys are set
    Keys,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Default)]
struct ImageArgs {
    /// Aspect ratio, e.g. 1:1 or 16:9
    #[arg(long)]
    aspect_ratio: Option<String>,
    /// Use the high-quality Gemini model
    #[arg(long)]
    high_quality: bool,
    /// Output size for high-quality images (1K, 2K, 4K)
    #[arg(long, requires = "high_quality")]
    image_size: Option<String>,
    /// gemini or seed-dream-4.5
    #[arg(long, value_parser = parse_model)]
    model: Option<ImageModel>,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Directory for result files
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Bundle results into a zip archive (default name when no path is given)
    #[arg(long, num_args = 0..=1)]
    archive: Option<Option<PathBuf>>,
    /// Jobs allowed to run at once
    #[arg(short, long)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_model(s: &str) -> Result<ImageModel, String> {
    ImageModel::parse(s).ok_or_else(|| format!("unknown model '{}' (gemini, seed-dream-4.5)", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let directive = if cli.quiet { "mediaqueue=warn" } else { "mediaqueue=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let output = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::TextToImage {
            prompts,
            count,
            image,
            run,
        } => {
            let jobs = text_to_image_jobs(&prompts, count, &image);
            cmd_run(jobs, run, output).await
        }

        Commands::Remix {
            images,
            prompt,
            count,
            image,
            run,
        } => {
            let jobs = remix_jobs(&images, &prompt, count, &image)?;
            cmd_run(jobs, run, output).await
        }

        Commands::RemoveBg { images, run } => {
            let jobs = images
                .iter()
                .map(|path| {
                    let payload = JobPayload::default().with_image(load_image(path)?, file_name(path));
                    Ok(NewJob::new(JobType::RemoveBackground, payload))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            cmd_run(jobs, run, output).await
        }

        Commands::Video {
            prompt,
            image,
            aspect_ratio,
            resolution,
            run,
        } => {
            let mut payload = JobPayload {
                prompt,
                aspect_ratio,
                resolution,
                ..Default::default()
            };
            if let Some(path) = image {
                payload = payload.with_image(load_image(&path)?, file_name(&path));
            }
            cmd_run(vec![NewJob::new(JobType::GenerateVideo, payload)], run, output).await
        }

        Commands::Batch { file, run } => {
            let jobs = load_batch(&file)?;
            cmd_run(jobs, run, output).await
        }

        Commands::Keys => cmd_keys(output),

        Commands::Config { action } => cmd_config(action, output),
    }
}

// ============================================================================
// Job construction
// ============================================================================

fn image_payload(args: &ImageArgs) -> JobPayload {
    JobPayload {
        aspect_ratio: args.aspect_ratio.clone(),
        high_quality: args.high_quality.then_some(true),
        image_size: args.image_size.clone(),
        model: args.model,
        ..Default::default()
    }
}

fn parse_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn text_to_image_jobs(prompts: &[String], count: usize, args: &ImageArgs) -> Vec<NewJob> {
    prompts
        .iter()
        .flat_map(|prompt| {
            let payload = image_payload(args).with_prompt(prompt.clone());
            std::iter::repeat_n(NewJob::new(JobType::TextToImage, payload), count)
        })
        .collect()
}

fn remix_jobs(
    images: &[PathBuf],
    prompt: &str,
    count: usize,
    args: &ImageArgs,
) -> anyhow::Result<Vec<NewJob>> {
    let mut jobs = Vec::with_capacity(images.len() * count);
    for path in images {
        let payload = image_payload(args)
            .with_prompt(prompt)
            .with_image(load_image(path)?, file_name(path));
        jobs.extend(std::iter::repeat_n(
            NewJob::new(JobType::RemixImage, payload),
            count,
        ));
    }
    Ok(jobs)
}

fn load_image(path: &Path) -> anyhow::Result<MediaData> {
    MediaData::load(path).with_context(|| format!("Failed to load image: {}", path.display()))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// One entry of a batch file. `image_path` is resolved against the file's directory.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    #[serde(flatten)]
    job: NewJob,
    #[serde(default)]
    image_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    List(Vec<BatchEntry>),
    Table { jobs: Vec<BatchEntry> },
}

impl BatchFile {
    fn into_entries(self) -> Vec<BatchEntry> {
        match self {
            Self::List(entries) | Self::Table { jobs: entries } => entries,
        }
    }
}

fn parse_batch(contents: &str, is_toml: bool) -> anyhow::Result<Vec<BatchEntry>> {
    let file: BatchFile = if is_toml {
        toml::from_str(contents).context("Invalid TOML batch file")?
    } else {
        serde_json::from_str(contents).context("Invalid JSON batch file")?
    };
    Ok(file.into_entries())
}

fn load_batch(path: &Path) -> anyhow::Result<Vec<NewJob>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let entries = parse_batch(&contents, is_toml)?;
    if entries.is_empty() {
        bail!("Batch file {} contains no jobs", path.display());
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    entries
        .into_iter()
        .map(|entry| {
            let mut job = entry.job;
            if let Some(image_path) = entry.image_path {
                let resolved = base.join(&image_path);
                job.payload = job
                    .payload
                    .with_image(load_image(&resolved)?, file_name(&resolved));
            }
            Ok(job)
        })
        .collect()
}

// ============================================================================
// Command Implementations
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn text(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}

#[derive(Serialize)]
struct JobSummary {
    id: JobId,
    #[serde(rename = "type")]
    job_type: JobType,
    status: JobStatus,
    title: String,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<i64>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            title: job.title(),
            attempts: job.attempts,
            error: job.error.clone(),
            duration_ms: job.duration_ms(),
        }
    }
}

#[derive(Serialize)]
struct RunSummary {
    stats: JobStats,
    jobs: Vec<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<ExportReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<ExportReport>,
}

async fn cmd_run(jobs: Vec<NewJob>, run: RunArgs, output: Output) -> anyhow::Result<()> {
    for job in &jobs {
        job.payload.validate_for(job.job_type)?;
    }

    let mut config = Config::load()?;
    if let Some(concurrency) = run.concurrency {
        if concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        config.queue.max_concurrent = concurrency;
    }

    let router = ProviderRouter::new(&config, Credentials::from_env())?;
    let queue = JobQueue::new(Arc::new(router), QueueOptions::from(&config.queue));
    let mut events = queue.subscribe();

    let ids = queue.add_jobs(jobs)?;
    info!(jobs = ids.len(), max_concurrent = queue.max_concurrent(), "Jobs queued");
    if output.text() {
        println!(
            "Queued {} job(s), running up to {} at a time",
            ids.len(),
            queue.max_concurrent()
        );
    }
    queue.start()?;

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => print_event(&queue, &event, output),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed progress events"),
                Err(RecvError::Closed) => break,
            },
            stats = queue.wait_idle(None) => {
                stats?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping queue");
                queue.shutdown().await;
                break;
            }
        }
    }

    let jobs: Vec<Job> = queue.jobs();
    let stats = queue.stats();

    let results = match (&run.out, &run.archive) {
        (Some(dir), _) => Some(archive::write_results(dir, &jobs, Some(ids.as_slice()))?),
        (None, None) => Some(archive::write_results(Path::new("."), &jobs, Some(ids.as_slice()))?),
        (None, Some(_)) => None,
    };

    let archive = match &run.archive {
        Some(_) if stats.completed == 0 => {
            warn!("No completed jobs, skipping archive");
            None
        }
        Some(path) => {
            let path = path.clone().unwrap_or_else(|| {
                let date = chrono::Local::now().date_naive();
                PathBuf::from(archive::default_archive_name(&config.export.archive_prefix, date))
            });
            Some(archive::export_archive(&path, &jobs, Some(ids.as_slice()))?)
        }
        None => None,
    };

    let summary = RunSummary {
        stats,
        jobs: jobs.iter().map(JobSummary::from).collect(),
        results,
        archive,
    };
    print_summary(&summary, output)?;

    if stats.failed > 0 {
        return Err(anyhow!("{} of {} job(s) failed", stats.failed, stats.total()));
    }
    if stats.pending > 0 {
        return Err(anyhow!("{} job(s) did not run", stats.pending));
    }
    Ok(())
}

fn short_id(id: JobId) -> String {
    id.to_string().chars().take(8).collect()
}

fn print_event(queue: &JobQueue, event: &JobEvent, output: Output) {
    if !output.text() {
        return;
    }
    let title = queue
        .get(event.job_id())
        .map(|job| job.title())
        .unwrap_or_else(|| event.job_type().to_string());
    let id = short_id(event.job_id());

    match event {
        JobEvent::Queued { .. } => {}
        JobEvent::Started { .. } => println!("[..] {} {}", id, title),
        JobEvent::Retrying {
            attempt,
            max_attempts,
            delay_ms,
            rotated_key,
            ..
        } => {
            let rotated = if *rotated_key { ", switched API key" } else { "" };
            println!(
                "[~~] {} rate limited ({}/{}), retrying in {:.1}s{}",
                id,
                attempt,
                max_attempts,
                *delay_ms as f64 / 1000.0,
                rotated
            );
        }
        JobEvent::Completed { bytes, mime_type, .. } => {
            println!("[OK] {} {} ({}, {} bytes)", id, title, mime_type, bytes)
        }
        JobEvent::Failed { error, .. } => println!("[!!] {} {}: {}", id, title, error),
    }
}

fn print_summary(summary: &RunSummary, output: Output) -> anyhow::Result<()> {
    if output.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    println!();
    println!(
        "Completed: {}  Failed: {}  Pending: {}",
        summary.stats.completed, summary.stats.failed, summary.stats.pending
    );
    if let Some(results) = &summary.results
        && !results.written.is_empty()
    {
        let dir = results.path.as_deref().unwrap_or_else(|| Path::new("."));
        println!("Wrote {} file(s) to {}", results.written.len(), dir.display());
        for entry in &results.written {
            println!("  {}", entry.name);
        }
    }
    if let Some(archive) = &summary.archive
        && let Some(path) = &archive.path
    {
        println!(
            "Archive: {} ({} entries, {} bytes)",
            path.display(),
            archive.written.len(),
            archive.total_bytes()
        );
    }
    for job in summary.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        println!(
            "  Failed {} {}: {}",
            short_id(job.id),
            job.title,
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn cmd_keys(output: Output) -> anyhow::Result<()> {
    let credentials = Credentials::from_env();
    let summary = credentials.summary();

    if output.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for status in &summary {
        if status.is_set() {
            println!(
                "[OK] {}: {} key(s) ({})",
                status.provider,
                status.keys.len(),
                status.keys.join(", ")
            );
        } else {
            println!("[!!] {}: Not configured", status.provider);
            if !output.quiet {
                println!("     Set {} environment variable", status.env_var);
            }
        }
    }
    if let Some(url) = &credentials.seedream_base_url
        && !output.quiet
    {
        println!("     Seed Dream base URL override: {}", url);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, output: Output) -> anyhow::Result<()> {
    let json = output.format == OutputFormat::Json;
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            if json {
                println!("{}", serde_json::json!({ "key": key, "value": value }));
            } else {
                println!("{}", value);
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !output.quiet {
                println!("Set {} = {}", key, config.get(&key)?);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !output.quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
