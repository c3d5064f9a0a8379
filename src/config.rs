//! Configuration for callharvest.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of this)
//! 2. Environment variables (CALLHARVEST_DATA, FFPROBE_PATH)
//! 3. Config file (.callharvest/config.yaml)
//! 4. Defaults (./data, see [`paths`])
//!
//! Config file discovery:
//! - Searches current directory and parents for .callharvest/config.yaml
//! - Paths in config file are relative to the project root (the directory
//!   containing .callharvest/)
//!
//! Credentials are never read from the config file; they come from
//! `TWILIO_ACCOUNT_SID[_PROFILE]` / `TWILIO_AUTH_TOKEN[_PROFILE]`.

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::twilio::DEFAULT_API_BASE;
use crate::core::{IngestSettings, RunLayout};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".callharvest";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub ffprobe: FfprobeConfig,
}

/// Path overrides; anything unset falls back to the default layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data root (relative to project root)
    pub data: Option<String>,
    pub source: Option<String>,
    pub source_pattern: Option<String>,
    pub dual_audio: Option<String>,
    pub mono_audio: Option<String>,
    pub dual_collection: Option<String>,
    pub mono_collection: Option<String>,
    pub no_recording_collection: Option<String>,
    pub failed_collection: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioConfig {
    pub api_base: Option<String>,
    /// Account profile, e.g. `closers`
    pub account: Option<String>,
    #[serde(default)]
    pub authenticate_media: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FfprobeConfig {
    pub path: Option<String>,
}

/// Explicit paths from the config file, already resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathOverrides {
    pub source: Option<PathBuf>,
    pub source_pattern: Option<String>,
    pub dual_audio: Option<PathBuf>,
    pub mono_audio: Option<PathBuf>,
    pub dual_collection: Option<PathBuf>,
    pub mono_collection: Option<PathBuf>,
    pub no_recording_collection: Option<PathBuf>,
    pub failed_collection: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwilioSettings {
    pub api_base: String,
    pub account: Option<String>,
    pub authenticate_media: bool,
}

impl Default for TwilioSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            account: None,
            authenticate_media: false,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Root the default layout is built under
    pub data_root: PathBuf,
    pub paths: PathOverrides,
    pub ingest: IngestSettings,
    pub twilio: TwilioSettings,
    pub ffprobe_path: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// The run layout: explicit paths where configured, defaults under the
    /// data root elsewhere
    pub fn layout(&self) -> RunLayout {
        let defaults = paths::default_layout(&self.data_root);
        let p = &self.paths;

        RunLayout {
            source_dir: p.source.clone().unwrap_or(defaults.source_dir),
            source_pattern: p.source_pattern.clone().unwrap_or(defaults.source_pattern),
            staging_dir: p.dual_audio.clone().unwrap_or(defaults.staging_dir),
            mono_dir: p.mono_audio.clone().unwrap_or(defaults.mono_dir),
            collections: crate::core::CollectionPaths {
                dual: p.dual_collection.clone().unwrap_or(defaults.collections.dual),
                mono: p.mono_collection.clone().unwrap_or(defaults.collections.mono),
                no_recording: p
                    .no_recording_collection
                    .clone()
                    .unwrap_or(defaults.collections.no_recording),
                failed: p
                    .failed_collection
                    .clone()
                    .unwrap_or(defaults.collections.failed),
            },
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Merge a parsed config file (if any) with the environment
fn resolve(config_path: Option<PathBuf>, file: ConfigFile, cwd: &Path) -> ResolvedConfig {
    // Project root is the parent of .callharvest/
    let base_dir = config_path
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(cwd)
        .to_path_buf();

    let data_root = if let Some(env_data) = env_var("CALLHARVEST_DATA") {
        PathBuf::from(env_data)
    } else if let Some(ref data) = file.paths.data {
        resolve_path(&base_dir, data)
    } else {
        base_dir.join(paths::DATA_DIR)
    };

    let explicit = |p: &Option<String>| p.as_deref().map(|s| resolve_path(&base_dir, s));
    let overrides = PathOverrides {
        source: explicit(&file.paths.source),
        source_pattern: file.paths.source_pattern.clone(),
        dual_audio: explicit(&file.paths.dual_audio),
        mono_audio: explicit(&file.paths.mono_audio),
        dual_collection: explicit(&file.paths.dual_collection),
        mono_collection: explicit(&file.paths.mono_collection),
        no_recording_collection: explicit(&file.paths.no_recording_collection),
        failed_collection: explicit(&file.paths.failed_collection),
    };

    let twilio = TwilioSettings {
        api_base: file
            .twilio
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        account: file.twilio.account,
        authenticate_media: file.twilio.authenticate_media,
    };

    let ffprobe_path = env_var("FFPROBE_PATH")
        .or(file.ffprobe.path)
        .unwrap_or_else(|| "ffprobe".to_string());

    ResolvedConfig {
        data_root,
        paths: overrides,
        ingest: file.ingest,
        twilio,
        ffprobe_path,
        config_file: config_path,
    }
}

/// Load configuration from all sources, discovering from `start`
fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let config_path = find_config_file(start);
    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(config_path, file, start))
}

fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, yaml: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = resolve(None, ConfigFile::default(), temp.path());

        assert_eq!(config.ingest, IngestSettings::default());
        assert_eq!(config.twilio, TwilioSettings::default());
        assert!(config.config_file.is_none());

        let layout = config.layout();
        if std::env::var("CALLHARVEST_DATA").is_err() {
            assert_eq!(config.data_root, temp.path().join("data"));
            assert_eq!(layout.source_dir, temp.path().join("data/to-download"));
        }
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1.0"
paths:
  data: ./calls
  mono_audio: /mnt/mono
ingest:
  concurrency: 5
  min_duration_seconds: 90
twilio:
  account: closers
  authenticate_media: true
"#,
        );

        let file = load_config_file(&path).unwrap();
        assert_eq!(file.version.as_deref(), Some("1.0"));
        assert_eq!(file.ingest.concurrency, 5);
        assert_eq!(file.ingest.page_limit, 20);
        assert_eq!(file.twilio.account.as_deref(), Some("closers"));

        let config = resolve(Some(path.clone()), file, temp.path());
        let layout = config.layout();
        assert_eq!(layout.mono_dir, PathBuf::from("/mnt/mono"));
        if std::env::var("CALLHARVEST_DATA").is_err() {
            assert_eq!(config.data_root, temp.path().join("./calls"));
            assert_eq!(layout.staging_dir, temp.path().join("./calls").join("AUDIO/dual-audios"));
        }
        assert!(config.twilio.authenticate_media);
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_ffprobe_binary_from_config_file() {
        let file: ConfigFile =
            serde_yaml::from_str("ffprobe:\n  path: /opt/ffmpeg/bin/ffprobe\n").unwrap();
        let configured = resolve(None, file, Path::new("/srv/calls"));
        let defaulted = resolve(None, ConfigFile::default(), Path::new("/srv/calls"));

        if std::env::var("FFPROBE_PATH").is_err() {
            assert_eq!(configured.ffprobe_path, "/opt/ffmpeg/bin/ffprobe");
            assert_eq!(defaulted.ffprobe_path, "ffprobe");
        }
    }

    #[test]
    fn test_discovery_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1.0\"");
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
        let config = load_config_from(&nested).unwrap();
        assert!(config.config_file.is_some());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "ingest: [not, a, map]");
        assert!(load_config_from(temp.path()).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
