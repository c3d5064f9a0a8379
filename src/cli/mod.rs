//! Command-line interface for callharvest.
//!
//! Provides commands for running an ingestion pass, listing the calls that
//! are still missing from the output collections, and showing the resolved
//! configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{AccountCredentials, FfprobeAdapter, TwilioClient};
use crate::config;
use crate::core::{
    recorded_call_sids, remaining_records, write_records, AssetFetcher, Orchestrator, RunSummary,
};

/// Default output of `remaining`, relative to the data root
const REMAINING_FILE: &str = "filtered.json";

/// callharvest - Call recording ingestion
#[derive(Parser, Debug)]
#[command(name = "callharvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download, classify and record call recordings
    Run {
        /// Data root (defaults to ./data or the config file)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Directory of input call collections
        #[arg(long)]
        source: Option<PathBuf>,

        /// Account profile selecting TWILIO_ACCOUNT_SID_<PROFILE> credentials
        #[arg(short, long, env = "CALLHARVEST_ACCOUNT")]
        account: Option<String>,

        /// Maximum concurrent calls in flight
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Start every call at once
        #[arg(long, conflicts_with = "concurrency")]
        no_rate_limit: bool,

        /// Only calls strictly longer than this many seconds are processed
        #[arg(long)]
        min_duration: Option<i64>,

        /// Send account credentials with recording downloads
        #[arg(long)]
        authenticate_media: bool,
    },

    /// Write input calls that have no outcome in any output collection
    Remaining {
        /// Input call collections
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file (default: <data>/filtered.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                data,
                source,
                account,
                concurrency,
                no_rate_limit,
                min_duration,
                authenticate_media,
            } => {
                let options = RunOptions {
                    data,
                    source,
                    account,
                    concurrency,
                    no_rate_limit,
                    min_duration,
                    authenticate_media,
                };
                run_ingest(options).await
            }
            Commands::Remaining { input, output } => write_remaining(input, output).await,
            Commands::Config => show_config(),
        }
    }
}

/// Flag overrides for a run
#[derive(Debug, Default)]
struct RunOptions {
    data: Option<PathBuf>,
    source: Option<PathBuf>,
    account: Option<String>,
    concurrency: Option<usize>,
    no_rate_limit: bool,
    min_duration: Option<i64>,
    authenticate_media: bool,
}

/// Run one ingestion pass
async fn run_ingest(options: RunOptions) -> Result<()> {
    let mut cfg = config::config()?.clone();
    if let Some(data) = options.data {
        cfg.data_root = data;
    }

    let mut layout = cfg.layout();
    if let Some(source) = options.source {
        layout.source_dir = source;
    }

    let mut settings = cfg.ingest.clone();
    if let Some(n) = options.concurrency {
        settings.rate_limiting = true;
        settings.concurrency = n;
    }
    if options.no_rate_limit {
        settings.rate_limiting = false;
    }
    if let Some(min) = options.min_duration {
        settings.min_duration_seconds = min;
    }

    let account = options.account.or_else(|| cfg.twilio.account.clone());
    let credentials = AccountCredentials::from_env(account.as_deref())
        .context("Failed to load account credentials")?;

    let client = TwilioClient::with_api_base(credentials.clone(), cfg.twilio.api_base.clone());
    let probe = FfprobeAdapter::with_binary_path(cfg.ffprobe_path.clone());

    let mut fetcher = AssetFetcher::new(&layout.staging_dir);
    if options.authenticate_media || cfg.twilio.authenticate_media {
        fetcher = fetcher.with_basic_auth(credentials);
    }

    let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(probe), fetcher, settings, layout);
    let summary = orchestrator.run().await?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;

    println!("Run ID:   {}", summary.run_id);
    println!("Duration: {}s", elapsed.num_seconds());
    println!();
    println!("Inputs:");
    println!("  Files read:        {}", summary.files_read);
    println!("  Files skipped:     {}", summary.files_skipped);
    println!("  Records seen:      {}", summary.records_seen);
    println!("  Invalid:           {}", summary.records_invalid);
    println!("  Too short:         {}", summary.records_filtered);
    println!("  Duplicates:        {}", summary.duplicates);
    println!("  Already recorded:  {}", summary.already_recorded);
    println!();
    println!("Tasks:");
    println!("  Dispatched:        {}", summary.dispatched);
    println!("  Succeeded:         {}", summary.settled.fulfilled);
    println!("  Failed:            {}", summary.settled.rejected);
    println!("  Recordings reused: {}", summary.recordings_skipped);
    println!();
    println!("Rows written:");
    println!("  Dual:              {}", summary.rows.dual);
    println!("  Mono:              {}", summary.rows.mono);
    println!("  No recording:      {}", summary.rows.no_recording);
    println!("  Failed:            {}", summary.rows.failed);
}

/// Diff input collections against the output collections
async fn write_remaining(inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let layout = cfg.layout();

    let recorded = recorded_call_sids(&layout.collections).await?;
    let remaining = remaining_records(&inputs, &recorded).await?;

    let output = output.unwrap_or_else(|| cfg.data_root.join(REMAINING_FILE));
    write_records(&output, &remaining).await?;

    println!(
        "{} calls remaining ({} already recorded) -> {}",
        remaining.len(),
        recorded.len(),
        output.display()
    );
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let layout = cfg.layout();

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Data root:        {}", cfg.data_root.display());
    println!("  Source:           {}/{}", layout.source_dir.display(), layout.source_pattern);
    println!("  Dual audio:       {}", layout.staging_dir.display());
    println!("  Mono audio:       {}", layout.mono_dir.display());
    println!();
    println!("Collections:");
    println!("  Dual:             {}", layout.collections.dual.display());
    println!("  Mono:             {}", layout.collections.mono.display());
    println!("  No recording:     {}", layout.collections.no_recording.display());
    println!("  Failed:           {}", layout.collections.failed.display());
    println!();
    println!("Ingest:");
    match cfg.ingest.concurrency_limit() {
        Some(n) => println!("  Concurrency:      {}", n),
        None => println!("  Concurrency:      unbounded"),
    }
    println!("  Min duration:     {}s", cfg.ingest.min_duration_seconds);
    println!("  Page limit:       {}", cfg.ingest.page_limit);
    println!();
    println!("Twilio:");
    println!("  API base:         {}", cfg.twilio.api_base);
    let (sid_key, token_key) = AccountCredentials::env_keys(cfg.twilio.account.as_deref());
    println!("  Credentials:      {} / {}", sid_key, token_key);
    println!("  Authenticate media: {}", cfg.twilio.authenticate_media);
    println!();
    println!("ffprobe: {}", cfg.ffprobe_path);

    Ok(())
}
