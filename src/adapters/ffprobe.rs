//! ffprobe adapter for reading audio stream layout.
//!
//! Runs `ffprobe -v error -print_format json -show_streams <file>` and reads
//! the channel count of the first audio stream.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use super::MediaProbe;

/// Errors from probing a media file
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe exited with code {code} for {path}: {stderr}")]
    Failed {
        path: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No audio stream found in {0}")]
    NoAudioStream(String),
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
}

/// Channel count of the first audio stream in ffprobe's JSON output
pub fn parse_audio_channels(json: &str, path: &str) -> Result<u32, ProbeError> {
    let output: ProbeOutput = serde_json::from_str(json)?;

    output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| s.channels)
        .ok_or_else(|| ProbeError::NoAudioStream(path.to_string()))
}

/// ffprobe subprocess adapter
pub struct FfprobeAdapter {
    binary_path: String,
}

impl FfprobeAdapter {
    /// Binary as resolved by the config layer (`FFPROBE_PATH`, config file,
    /// then `ffprobe` from `PATH`)
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeAdapter {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn audio_channels(&self, path: &Path) -> Result<u32, ProbeError> {
        let output = Command::new(&self.binary_path)
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                binary: self.binary_path.clone(),
                source,
            })?;

        let display = path.display().to_string();

        if !output.status.success() {
            return Err(ProbeError::Failed {
                path: display,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_audio_channels(&stdout, &display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_audio_stream() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 640},
                {"index": 1, "codec_type": "audio", "codec_name": "pcm_s16le", "channels": 2},
                {"index": 2, "codec_type": "audio", "channels": 1}
            ]
        }"#;
        assert_eq!(parse_audio_channels(json, "a.wav").unwrap(), 2);
    }

    #[test]
    fn test_parse_mono() {
        let json = r#"{"streams": [{"codec_type": "audio", "channels": 1}]}"#;
        assert_eq!(parse_audio_channels(json, "a.mp3").unwrap(), 1);
    }

    #[test]
    fn test_parse_without_audio_stream() {
        let json = r#"{"streams": [{"codec_type": "video"}]}"#;
        assert!(matches!(
            parse_audio_channels(json, "v.mp4"),
            Err(ProbeError::NoAudioStream(_))
        ));
        assert!(matches!(
            parse_audio_channels("{}", "empty"),
            Err(ProbeError::NoAudioStream(_))
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_audio_channels("not json", "x"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let probe = FfprobeAdapter::with_binary_path("/nonexistent/ffprobe-binary");
        let result = probe.audio_channels(Path::new("whatever.wav")).await;
        assert!(matches!(result, Err(ProbeError::Spawn { .. })));
    }
}
