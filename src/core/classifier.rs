//! Channel-layout classification of downloaded recordings.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::{MediaProbe, ProbeError};
use crate::domain::AudioType;

/// Classifies a local file as mono or dual using a media probe.
///
/// Probe failures are returned as-is; there is no fallback label.
pub struct MediaClassifier {
    probe: Arc<dyn MediaProbe>,
}

impl MediaClassifier {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }

    pub async fn classify(&self, path: &Path) -> Result<AudioType, ProbeError> {
        let channels = self.probe.audio_channels(path).await?;
        Ok(AudioType::from_channels(channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProbe(Option<u32>);

    #[async_trait]
    impl MediaProbe for FixedProbe {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn audio_channels(&self, path: &Path) -> Result<u32, ProbeError> {
            self.0
                .ok_or_else(|| ProbeError::NoAudioStream(path.display().to_string()))
        }
    }

    #[tokio::test]
    async fn test_classify_by_channel_count() {
        let mono = MediaClassifier::new(Arc::new(FixedProbe(Some(1))));
        let dual = MediaClassifier::new(Arc::new(FixedProbe(Some(2))));

        assert_eq!(mono.classify(Path::new("a.wav")).await.unwrap(), AudioType::Mono);
        assert_eq!(dual.classify(Path::new("a.wav")).await.unwrap(), AudioType::Dual);
    }

    #[tokio::test]
    async fn test_probe_failure_propagates() {
        let broken = MediaClassifier::new(Arc::new(FixedProbe(None)));
        assert!(broken.classify(Path::new("bad.wav")).await.is_err());
    }
}
