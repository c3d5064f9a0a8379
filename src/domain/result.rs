//! Rows appended to the output collections.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::asset::{recording_sid, AudioType, DownloadedAsset};
use super::record::CallRecord;

/// A downloaded and classified recording, ready for routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResult {
    #[serde(rename = "CallDuration", default, skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<Value>,

    /// The URL variant the asset was fetched from
    #[serde(rename = "RecordingUrl")]
    pub recording_url: String,

    #[serde(rename = "CallSid")]
    pub call_sid: String,

    #[serde(rename = "RecordingSid", default, skip_serializing_if = "Option::is_none")]
    pub recording_sid: Option<String>,

    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    #[serde(rename = "AudioPath")]
    pub audio_path: PathBuf,

    #[serde(rename = "Type")]
    pub audio_type: AudioType,
}

impl ClassifiedResult {
    pub fn new(record: &CallRecord, asset: &DownloadedAsset, audio_type: AudioType) -> Self {
        Self {
            call_duration: record.duration().cloned(),
            recording_url: asset.source_url.clone(),
            call_sid: record.call_sid.clone(),
            recording_sid: recording_sid(&asset.source_url),
            timestamp: record.timestamp().cloned(),
            audio_path: asset.path.clone(),
            audio_type,
        }
    }

    /// Copy of this result pointing at a relocated file
    pub fn relocated(&self, path: &Path) -> Self {
        Self {
            audio_path: path.to_path_buf(),
            ..self.clone()
        }
    }
}

/// Pipeline stage at which a record was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Recordings could not be listed
    Resolve,
    /// At least one listed recording could not be fetched, classified or routed
    Asset,
}

/// A call given up on, whole or in part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    #[serde(rename = "CallSid")]
    pub call_sid: String,

    #[serde(rename = "CallDuration", default, skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<Value>,

    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    #[serde(rename = "Stage")]
    pub stage: FailureStage,

    /// Recordings listed for the call, for asset failures
    #[serde(rename = "RecordingCount", default, skip_serializing_if = "Option::is_none")]
    pub recording_count: Option<usize>,

    #[serde(rename = "Error")]
    pub error: String,

    #[serde(rename = "FailedAt")]
    pub failed_at: DateTime<Utc>,
}

impl FailedRecord {
    pub fn new(record: &CallRecord, stage: FailureStage, error: impl ToString) -> Self {
        Self {
            call_sid: record.call_sid.clone(),
            call_duration: record.duration().cloned(),
            timestamp: record.timestamp().cloned(),
            stage,
            recording_count: None,
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }

    pub fn with_recording_count(mut self, count: usize) -> Self {
        self.recording_count = Some(count);
        self
    }
}
