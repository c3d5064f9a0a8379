//! Downloaded assets and their classification.

use std::fmt;
use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Channel layout of a downloaded recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioType {
    /// Exactly one audio channel
    Mono,

    /// Two or more audio channels
    Dual,
}

impl AudioType {
    /// Classify from a probed channel count
    pub fn from_channels(channels: u32) -> Self {
        if channels == 1 {
            Self::Mono
        } else {
            Self::Dual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Dual => "dual",
        }
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File extension resolved from a response's declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetExtension {
    Mp3,
    Wav,
}

impl AssetExtension {
    /// Resolve from a `Content-Type` header value.
    ///
    /// Parameters after `;` are ignored and the media type is compared
    /// case-insensitively.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/mpeg" => Some(Self::Mp3),
            "audio/wav" | "audio/x-wav" => Some(Self::Wav),
            _ => None,
        }
    }

    /// Extension including the leading dot
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => ".mp3",
            Self::Wav => ".wav",
        }
    }
}

/// A recording written to the staging directory
#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    /// Owning call
    pub call_sid: String,

    /// Local file path (staging directory until routed)
    pub path: PathBuf,

    /// Resolved extension
    pub extension: AssetExtension,

    /// The request URL that actually succeeded
    pub source_url: String,
}

/// Derive a recording id from its media URL.
///
/// Takes the last non-empty path segment and strips a trailing file
/// extension, so `.../Recordings/RE123.wav?RequestedChannels=2` yields
/// `RE123`.
pub fn recording_sid(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;

    let stem = match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => segment,
    };

    Some(stem.to_string())
}
