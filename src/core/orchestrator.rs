//! Ingestion run orchestration.
//!
//! One run: discover the input files, open the output collections, read and
//! filter call records, dispatch one task per qualifying record through the
//! rate limiter, wait for every task to settle, then finalize the
//! collections.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{MediaProbe, RecordingSource};
use crate::domain::{recording_sid, CallRecord, ClassifiedResult, FailedRecord, FailureStage};

use super::classifier::MediaClassifier;
use super::collection::{CollectionCounts, CollectionPaths, OutputCollections, RecordedManifest};
use super::fetcher::{asset_id, AssetFetcher};
use super::limiter::{RateLimiter, Settled};
use super::router::OutputRouter;

/// Tunables for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Cap concurrent tasks at `concurrency` (off: unbounded)
    #[serde(default = "default_rate_limiting")]
    pub rate_limiting: bool,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records must last strictly longer than this to be dispatched
    #[serde(default = "default_min_duration")]
    pub min_duration_seconds: i64,

    /// Recordings listed per call
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

fn default_rate_limiting() -> bool {
    true
}

fn default_concurrency() -> usize {
    20
}

fn default_min_duration() -> i64 {
    60
}

fn default_page_limit() -> u32 {
    20
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            rate_limiting: default_rate_limiting(),
            concurrency: default_concurrency(),
            min_duration_seconds: default_min_duration(),
            page_limit: default_page_limit(),
        }
    }
}

impl IngestSettings {
    /// Limiter ceiling, `None` when rate limiting is off
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.rate_limiting.then_some(self.concurrency)
    }
}

/// Where a run reads from and writes to
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    /// Directory holding the input collections
    pub source_dir: PathBuf,

    /// File-name pattern selecting input collections
    pub source_pattern: String,

    /// Downloads land here; dual recordings stay here
    pub staging_dir: PathBuf,

    /// Mono recordings are moved here
    pub mono_dir: PathBuf,

    pub collections: CollectionPaths,
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_seen: usize,
    pub records_invalid: usize,
    pub records_filtered: usize,
    pub duplicates: usize,
    pub already_recorded: usize,
    pub dispatched: usize,
    /// Recordings of dispatched calls routed by an earlier run
    pub recordings_skipped: usize,
    pub settled: Settled,
    pub rows: CollectionCounts,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            files_read: 0,
            files_skipped: 0,
            records_seen: 0,
            records_invalid: 0,
            records_filtered: 0,
            duplicates: 0,
            already_recorded: 0,
            dispatched: 0,
            recordings_skipped: 0,
            settled: Settled::default(),
            rows: CollectionCounts::default(),
        }
    }
}

/// Shared by every task of a run
struct TaskContext {
    source: Arc<dyn RecordingSource>,
    fetcher: Arc<AssetFetcher>,
    classifier: MediaClassifier,
    router: OutputRouter,
    manifest: RecordedManifest,
    page_limit: u32,
    recordings_skipped: AtomicUsize,
}

/// Drives ingestion runs
pub struct Orchestrator {
    source: Arc<dyn RecordingSource>,
    probe: Arc<dyn MediaProbe>,
    fetcher: Arc<AssetFetcher>,
    settings: IngestSettings,
    layout: RunLayout,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RecordingSource>,
        probe: Arc<dyn MediaProbe>,
        fetcher: AssetFetcher,
        settings: IngestSettings,
        layout: RunLayout,
    ) -> Self {
        Self {
            source,
            probe,
            fetcher: Arc::new(fetcher),
            settings,
            layout,
        }
    }

    /// Execute one full run
    pub async fn run(&self) -> Result<RunSummary> {
        self.execute(Uuid::new_v4()).await
    }

    #[instrument(skip_all, fields(%run_id, source = self.source.name(), probe = self.probe.name()))]
    async fn execute(&self, run_id: Uuid) -> Result<RunSummary> {
        let mut summary = RunSummary::new(run_id);
        info!(
            source_dir = %self.layout.source_dir.display(),
            concurrency = ?self.settings.concurrency_limit(),
            "Starting ingestion run"
        );

        let inputs = discover_sources(&self.layout.source_dir, &self.layout.source_pattern).await?;
        info!(files = inputs.len(), "Discovered input collections");

        for dir in [&self.layout.staging_dir, &self.layout.mono_dir] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let (collections, manifest) = OutputCollections::open(&self.layout.collections)
            .context("Failed to open output collections")?;
        let collections = Arc::new(collections);
        if manifest.settled_calls() > 0 {
            info!(calls = manifest.settled_calls(), "Calls already recorded by earlier runs");
        }

        let ctx = Arc::new(TaskContext {
            source: self.source.clone(),
            fetcher: self.fetcher.clone(),
            classifier: MediaClassifier::new(self.probe.clone()),
            router: OutputRouter::new(collections.clone(), &self.layout.mono_dir),
            manifest,
            page_limit: self.settings.page_limit,
            recordings_skipped: AtomicUsize::new(0),
        });

        let limiter = RateLimiter::from_limit(self.settings.concurrency_limit());
        let mut seen = HashSet::new();

        for input in &inputs {
            let values = match read_input(input).await {
                Ok(values) => values,
                Err(e) => {
                    error!(path = %input.display(), error = %format!("{:#}", e), "Skipping input file");
                    summary.files_skipped += 1;
                    continue;
                }
            };
            summary.files_read += 1;

            for value in values {
                // Placeholder row of a finalized collection
                if value.as_object().is_some_and(|o| o.is_empty()) {
                    continue;
                }
                summary.records_seen += 1;

                let record = match CallRecord::from_value(value) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(path = %input.display(), error = %e, "Skipping invalid record");
                        summary.records_invalid += 1;
                        continue;
                    }
                };

                if !record.exceeds_duration(self.settings.min_duration_seconds) {
                    summary.records_filtered += 1;
                    continue;
                }
                if !seen.insert(record.call_sid.clone()) {
                    debug!(call_sid = %record.call_sid, "Duplicate call in input");
                    summary.duplicates += 1;
                    continue;
                }
                if ctx.manifest.is_complete(&record.call_sid) {
                    debug!(call_sid = %record.call_sid, "Call already recorded");
                    summary.already_recorded += 1;
                    continue;
                }

                limiter.submit(process_record(ctx.clone(), record));
                summary.dispatched += 1;
            }
        }

        info!(dispatched = summary.dispatched, "All records dispatched, waiting for tasks");
        summary.settled = limiter.await_all().await;
        summary.recordings_skipped = ctx.recordings_skipped.load(Ordering::SeqCst);

        collections
            .finalize_all()
            .await
            .context("Failed to finalize output collections")?;

        summary.rows = collections.counts();
        summary.finished_at = Utc::now();

        info!(
            dispatched = summary.dispatched,
            succeeded = summary.settled.fulfilled,
            failed = summary.settled.rejected,
            dual = summary.rows.dual,
            mono = summary.rows.mono,
            no_recording = summary.rows.no_recording,
            failed_rows = summary.rows.failed,
            "Ingestion run complete"
        );

        Ok(summary)
    }
}

/// Input collections in `dir` whose file name matches `pattern`, sorted
pub async fn discover_sources(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(pattern)
        .with_context(|| format!("Invalid source pattern: {}", pattern))?;

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read source directory {}", dir.display()))?;

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read source directory {}", dir.display()))?
    {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name));

        if matches && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

async fn read_input(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array", path.display()))
}

/// One record's chain: resolve, then fetch, classify and route each recording.
///
/// Recordings routed by an earlier run are skipped. If any recording fails,
/// an asset failure row keeps the call open for the next run. Returns the
/// number of rows routed.
async fn process_record(ctx: Arc<TaskContext>, record: CallRecord) -> Result<usize> {
    let call_sid = record.call_sid.clone();

    let urls = match ctx.source.list_recordings(&call_sid, ctx.page_limit).await {
        Ok(urls) => urls,
        Err(e) => {
            error!(%call_sid, error = %e, "Failed to list recordings");
            ctx.router
                .record_failure(&FailedRecord::new(&record, FailureStage::Resolve, &e))
                .await
                .with_context(|| format!("Failed to record resolve failure for {}", call_sid))?;
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to list recordings for {}", call_sid));
        }
    };

    if urls.is_empty() {
        info!(%call_sid, "No recordings for call");
        ctx.router
            .record_no_recording(&record)
            .await
            .with_context(|| format!("Failed to record call {} without recordings", call_sid))?;
        return Ok(0);
    }

    let total = urls.len();
    let mut routed = 0;
    let mut skipped = 0;

    for (index, url) in urls.iter().enumerate() {
        if recording_sid(url).is_some_and(|sid| ctx.manifest.has_recording(&call_sid, &sid)) {
            debug!(%call_sid, %url, "Recording already routed");
            skipped += 1;
            continue;
        }

        let id = asset_id(&call_sid, index, total);
        match process_asset(&ctx, &record, url, &id).await {
            Ok(result) => {
                debug!(%call_sid, audio_type = %result.audio_type, path = %result.audio_path.display(), "Recording routed");
                routed += 1;
            }
            Err(e) => {
                error!(%call_sid, %url, error = %format!("{:#}", e), "Recording failed");
            }
        }
    }

    if skipped > 0 {
        ctx.recordings_skipped.fetch_add(skipped, Ordering::SeqCst);
    }

    let failed = total - routed - skipped;
    if failed > 0 {
        let message = format!("{} of {} recordings failed", failed, total);
        ctx.router
            .record_failure(
                &FailedRecord::new(&record, FailureStage::Asset, &message).with_recording_count(total),
            )
            .await
            .with_context(|| format!("Failed to record asset failure for {}", call_sid))?;
        anyhow::bail!("{} for {}", message, call_sid);
    }
    Ok(routed)
}

async fn process_asset(
    ctx: &TaskContext,
    record: &CallRecord,
    url: &str,
    id: &str,
) -> Result<ClassifiedResult> {
    let asset = ctx.fetcher.fetch(url, &record.call_sid, id).await?;

    let audio_type = ctx
        .classifier
        .classify(&asset.path)
        .await
        .with_context(|| format!("Failed to classify {}", asset.path.display()))?;

    let result = ClassifiedResult::new(record, &asset, audio_type);
    Ok(ctx.router.route(result).await?)
}
