//! Streaming JSON array collections.
//!
//! Each collection is a single file written incrementally:
//!
//! ```text
//! [                      <- written before the first row
//! {"CallSid":"CA1",...}, <- one append, comma included
//! {"CallSid":"CA2",...},
//! {}]                    <- written on finalize
//! ```
//!
//! The trailing `{}` absorbs the dangling comma, so a finalized file is valid
//! JSON whose last element is an empty placeholder object. Readers must drop
//! it. A file is only valid JSON once finalized.
//!
//! Reopening an existing file continues it instead of corrupting it: a
//! finalized file has its trailer cut off on the first append, an
//! unfinalized one (crashed run) is appended to as-is.

use std::collections::{HashMap, HashSet};
use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::FailureStage;

/// Written once when a collection is created
pub const OPENING: &[u8] = b"[";

/// Written after every appended row
pub const SEPARATOR: u8 = b',';

/// Written once at finalize: placeholder object plus closing bracket
pub const TRAILER: &[u8] = b"{}]";

/// Call id field of every row
const ID_FIELD: &str = "CallSid";

/// Errors raised by collection sinks
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collection {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Collection {0} is locked by another run")]
    Locked(PathBuf),

    #[error("Collection {0} is already finalized")]
    Finalized(PathBuf),
}

impl CollectionError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What an existing collection file looked like when opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingState {
    /// Missing or blank
    Empty,

    /// Properly closed with the trailer
    Finalized,

    /// Opened but never closed (ends in `[` or `,`)
    Unfinalized,
}

/// Classify raw file content. Returns the state and the length to keep.
fn inspect(content: &[u8]) -> Option<(ExistingState, usize)> {
    let end = content
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    let body = &content[..end];

    if body.is_empty() {
        Some((ExistingState::Empty, 0))
    } else if body.ends_with(TRAILER) {
        Some((ExistingState::Finalized, end - TRAILER.len()))
    } else if body.ends_with(&[SEPARATOR]) || trim_start(body) == OPENING {
        Some((ExistingState::Unfinalized, end))
    } else {
        None
    }
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Parse the rows out of collection content, dropping the placeholder.
///
/// Accepts both finalized and unfinalized content.
pub fn parse_rows(content: &[u8]) -> Result<Vec<Value>, String> {
    let (state, keep) = inspect(content).ok_or_else(|| "unrecognised trailer".to_string())?;

    if state == ExistingState::Empty {
        return Ok(Vec::new());
    }

    let mut closed = content[..keep].to_vec();
    closed.extend_from_slice(TRAILER);

    let mut rows: Vec<Value> = serde_json::from_slice(&closed).map_err(|e| e.to_string())?;
    match rows.pop() {
        Some(Value::Object(map)) if map.is_empty() => Ok(rows),
        _ => Err("missing placeholder element".to_string()),
    }
}

/// Read every row of a collection file
pub async fn read_collection(path: &Path) -> Result<Vec<Value>, CollectionError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| CollectionError::io(path, e))?;

    parse_rows(&content).map_err(|reason| CollectionError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })
}

/// Open file plus whether the pre-existing tail has been dealt with
struct OpenFile {
    file: File,
    prepared: bool,
}

/// An append-only JSON array sink.
///
/// Lifecycle is `open -> append* -> finalize`. Appends are single writes
/// under a mutex, so concurrent tasks never tear each other's rows.
///
/// Opening only reads and locks. The file is first modified by the first
/// append (or by finalize), so a run that fails to start leaves earlier
/// collections exactly as they were.
pub struct JsonArraySink {
    path: PathBuf,
    file: Mutex<Option<OpenFile>>,
    existing: ExistingState,
    keep: u64,
    appended: AtomicUsize,
}

impl JsonArraySink {
    /// Open (or continue) a collection and take an exclusive lock on it
    pub fn open(path: &Path) -> Result<Self, CollectionError> {
        Self::open_with_rows(path).map(|(sink, _)| sink)
    }

    /// Like [`open`](Self::open), also returning the rows already present
    pub fn open_with_rows(path: &Path) -> Result<(Self, Vec<Value>), CollectionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CollectionError::io(parent, e))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| CollectionError::io(path, e))?;

        file.try_lock_exclusive()
            .map_err(|_| CollectionError::Locked(path.to_path_buf()))?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| CollectionError::io(path, e))?;

        let (existing, keep) = inspect(&content).ok_or_else(|| CollectionError::Corrupt {
            path: path.to_path_buf(),
            reason: "existing content does not end with a row separator or trailer".to_string(),
        })?;

        let rows = parse_rows(&content).map_err(|reason| CollectionError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!(
            path = %path.display(),
            state = ?existing,
            rows = rows.len(),
            "Opened collection"
        );

        let sink = Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(OpenFile {
                file: File::from_std(file),
                prepared: false,
            })),
            existing,
            keep: keep as u64,
            appended: AtomicUsize::new(0),
        };
        Ok((sink, rows))
    }

    /// State the file was in before this run opened it
    pub fn existing_state(&self) -> ExistingState {
        self.existing
    }

    /// Rows appended during this run
    pub fn appended(&self) -> usize {
        self.appended.load(Ordering::SeqCst)
    }

    /// Append one row followed by the separator
    pub async fn append<T: Serialize>(&self, row: &T) -> Result<(), CollectionError> {
        self.write_row(row, false).await
    }

    /// Append one row and wait until it is on disk
    pub async fn append_durable<T: Serialize>(&self, row: &T) -> Result<(), CollectionError> {
        self.write_row(row, true).await
    }

    /// Cut the old trailer (or write the opening bracket) before the first write
    async fn prepare(&self, open: &mut OpenFile) -> Result<(), CollectionError> {
        if open.prepared {
            return Ok(());
        }

        open.file
            .set_len(self.keep)
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;
        open.file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;

        if self.existing == ExistingState::Empty {
            open.file
                .write_all(OPENING)
                .await
                .map_err(|e| CollectionError::io(&self.path, e))?;
        }

        open.prepared = true;
        Ok(())
    }

    async fn write_row<T: Serialize>(&self, row: &T, sync: bool) -> Result<(), CollectionError> {
        let mut bytes = serde_json::to_vec(row)?;
        bytes.push(SEPARATOR);

        let mut guard = self.file.lock().await;
        let open = guard
            .as_mut()
            .ok_or_else(|| CollectionError::Finalized(self.path.clone()))?;
        self.prepare(open).await?;

        let file = &mut open.file;
        file.write_all(&bytes)
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;
        if sync {
            file.sync_data()
                .await
                .map_err(|e| CollectionError::io(&self.path, e))?;
        }

        self.appended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Write the trailer and close the file. A second call is an error.
    pub async fn finalize(&self) -> Result<(), CollectionError> {
        let mut guard = self.file.lock().await;
        let mut open = guard
            .take()
            .ok_or_else(|| CollectionError::Finalized(self.path.clone()))?;

        // Nothing appended to an already closed file: leave it untouched
        if !open.prepared && self.existing == ExistingState::Finalized {
            debug!(path = %self.path.display(), "Collection unchanged");
            return Ok(());
        }

        self.prepare(&mut open).await?;
        let file = &mut open.file;
        file.write_all(TRAILER)
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| CollectionError::io(&self.path, e))?;

        info!(
            path = %self.path.display(),
            appended = self.appended(),
            "Finalized collection"
        );
        Ok(())
    }
}

/// Key fields of a dual or mono row
#[derive(Deserialize)]
struct RoutedRow {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "RecordingSid", default)]
    recording_sid: Option<String>,
}

/// Key fields of a row in the failed collection
#[derive(Deserialize)]
struct FailureRow {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "Stage")]
    stage: FailureStage,
    #[serde(rename = "RecordingCount", default)]
    recording_count: Option<usize>,
}

/// What earlier runs already produced, per call and per recording.
///
/// A call is complete when it has a dual, mono or no-recording row and no
/// failed recording of it is still missing. Resolve failures never reach a
/// success collection, so those calls are retried anyway.
#[derive(Debug, Default)]
pub struct RecordedManifest {
    settled: HashSet<String>,
    recordings: HashMap<String, HashSet<String>>,
    expected: HashMap<String, usize>,
}

impl RecordedManifest {
    fn build(routed: &[Value], no_recording: &[Value], failed: &[Value]) -> Self {
        let mut manifest = Self::default();

        for row in routed {
            let Ok(row) = RoutedRow::deserialize(row) else {
                continue;
            };
            if let Some(recording_sid) = row.recording_sid {
                manifest
                    .recordings
                    .entry(row.call_sid.clone())
                    .or_default()
                    .insert(recording_sid);
            }
            manifest.settled.insert(row.call_sid);
        }

        for row in no_recording {
            if let Some(call_sid) = row.get(ID_FIELD).and_then(|v| v.as_str()) {
                manifest.settled.insert(call_sid.to_string());
            }
        }

        for row in failed {
            let Ok(row) = FailureRow::deserialize(row) else {
                continue;
            };
            if row.stage != FailureStage::Asset {
                continue;
            }
            let count = row.recording_count.unwrap_or(usize::MAX);
            let expected = manifest.expected.entry(row.call_sid).or_default();
            *expected = (*expected).max(count);
        }

        manifest
    }

    /// Whether an earlier run finished this call
    pub fn is_complete(&self, call_sid: &str) -> bool {
        if !self.settled.contains(call_sid) {
            return false;
        }
        match self.expected.get(call_sid) {
            Some(&expected) => self.recordings.get(call_sid).map_or(0, HashSet::len) >= expected,
            None => true,
        }
    }

    /// Whether a recording of this call was already routed
    pub fn has_recording(&self, call_sid: &str, recording_sid: &str) -> bool {
        self.recordings
            .get(call_sid)
            .is_some_and(|sids| sids.contains(recording_sid))
    }

    /// Calls with any terminal row from an earlier run
    pub fn settled_calls(&self) -> usize {
        self.settled.len()
    }
}

/// Locations of the four output collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPaths {
    pub dual: PathBuf,
    pub mono: PathBuf,
    pub no_recording: PathBuf,
    pub failed: PathBuf,
}

/// Row counts appended during a run, per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub dual: usize,
    pub mono: usize,
    pub no_recording: usize,
    pub failed: usize,
}

/// The run's output sinks, opened together and finalized together
pub struct OutputCollections {
    pub dual: JsonArraySink,
    pub mono: JsonArraySink,
    pub no_recording: JsonArraySink,
    pub failed: JsonArraySink,
}

impl OutputCollections {
    /// Open all four sinks and build the manifest of earlier runs.
    ///
    /// Every file is validated before any is modified.
    pub fn open(paths: &CollectionPaths) -> Result<(Self, RecordedManifest), CollectionError> {
        let (dual, mut routed) = JsonArraySink::open_with_rows(&paths.dual)?;
        let (mono, mono_rows) = JsonArraySink::open_with_rows(&paths.mono)?;
        let (no_recording, no_recording_rows) = JsonArraySink::open_with_rows(&paths.no_recording)?;
        let (failed, failed_rows) = JsonArraySink::open_with_rows(&paths.failed)?;

        routed.extend(mono_rows);
        let manifest = RecordedManifest::build(&routed, &no_recording_rows, &failed_rows);

        let collections = Self {
            dual,
            mono,
            no_recording,
            failed,
        };
        Ok((collections, manifest))
    }

    pub fn counts(&self) -> CollectionCounts {
        CollectionCounts {
            dual: self.dual.appended(),
            mono: self.mono.appended(),
            no_recording: self.no_recording.appended(),
            failed: self.failed.appended(),
        }
    }

    /// Finalize every sink, attempting all of them before reporting an error
    pub async fn finalize_all(&self) -> Result<(), CollectionError> {
        let mut first_error = None;
        for sink in [&self.dual, &self.mono, &self.no_recording, &self.failed] {
            if let Err(e) = sink.finalize().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
