//! Adapter interfaces for external systems.
//!
//! - `RecordingSource`: lists the recordings attached to a call (Twilio)
//! - `MediaProbe`: reads stream metadata from a local media file (ffprobe)

pub mod ffprobe;
pub mod twilio;

use std::path::Path;

use async_trait::async_trait;

pub use ffprobe::{FfprobeAdapter, ProbeError};
pub use twilio::{AccountCredentials, ResolveError, TwilioClient};

/// Trait for telephony APIs that can list a call's recordings
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Media URLs for a call's recordings, in API order, at most `page_limit`
    async fn list_recordings(
        &self,
        call_sid: &str,
        page_limit: u32,
    ) -> Result<Vec<String>, ResolveError>;
}

/// Trait for tools that inspect a media file's audio layout
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Human-readable probe name
    fn name(&self) -> &str;

    /// Channel count of the first audio stream in the file
    async fn audio_channels(&self, path: &Path) -> Result<u32, ProbeError>;
}
