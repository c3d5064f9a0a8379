//! Default data layout.
//!
//! Everything lives under one data root:
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `to-download/*.json` | Input call collections |
//! | `AUDIO/dual-audios/` | Download staging, dual recordings stay here |
//! | `AUDIO/mono-audios/` | Mono recordings |
//! | `JSON/dual-json/dual-calls.json` | Dual results |
//! | `JSON/mono-json/mono-calls.json` | Mono results |
//! | `JSON/client-json/no-recording-calls.json` | Calls without recordings |
//! | `JSON/failed-json/failed-calls.json` | Calls whose recordings could not be listed |

use std::path::Path;

use crate::core::{CollectionPaths, RunLayout};

/// Data root relative to the project root
pub const DATA_DIR: &str = "data";

pub const SOURCE_DIR: &str = "to-download";

pub const SOURCE_PATTERN: &str = "*.json";

pub const DUAL_AUDIO_DIR: &str = "AUDIO/dual-audios";

pub const MONO_AUDIO_DIR: &str = "AUDIO/mono-audios";

pub const DUAL_COLLECTION: &str = "JSON/dual-json/dual-calls.json";

pub const MONO_COLLECTION: &str = "JSON/mono-json/mono-calls.json";

pub const NO_RECORDING_COLLECTION: &str = "JSON/client-json/no-recording-calls.json";

pub const FAILED_COLLECTION: &str = "JSON/failed-json/failed-calls.json";

/// Output collections under `data_root`
pub fn default_collections(data_root: &Path) -> CollectionPaths {
    CollectionPaths {
        dual: data_root.join(DUAL_COLLECTION),
        mono: data_root.join(MONO_COLLECTION),
        no_recording: data_root.join(NO_RECORDING_COLLECTION),
        failed: data_root.join(FAILED_COLLECTION),
    }
}

/// Full run layout under `data_root`
pub fn default_layout(data_root: &Path) -> RunLayout {
    RunLayout {
        source_dir: data_root.join(SOURCE_DIR),
        source_pattern: SOURCE_PATTERN.to_string(),
        staging_dir: data_root.join(DUAL_AUDIO_DIR),
        mono_dir: data_root.join(MONO_AUDIO_DIR),
        collections: default_collections(data_root),
    }
}
