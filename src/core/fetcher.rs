//! Recording downloads.
//!
//! Each recording is first requested as a two-channel WAV rendition. If that
//! request fails for any reason the bare URL is requested once instead. The
//! response's content type decides the file extension; anything other than
//! MP3 or WAV is rejected without retrying.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::adapters::AccountCredentials;
use crate::domain::{AssetExtension, DownloadedAsset};

/// Appended to a media URL to request a dual-channel WAV rendition
pub const DUAL_CHANNEL_SUFFIX: &str = ".wav?RequestedChannels=2";

/// Errors from downloading one recording
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unsupported content type {content_type:?} from {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Body stream from {url} failed: {source}")]
    Stream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The dual-channel request variant of a media URL
pub fn dual_channel_url(url: &str) -> String {
    format!("{}{}", url, DUAL_CHANNEL_SUFFIX)
}

/// Staging file stem for the `index`-th of `total` recordings of a call.
///
/// A call with a single recording uses the bare call id.
pub fn asset_id(call_sid: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{}-{}", call_sid, index)
    } else {
        call_sid.to_string()
    }
}

/// Downloads recordings into the staging directory
pub struct AssetFetcher {
    client: reqwest::Client,
    staging_dir: PathBuf,
    credentials: Option<AccountCredentials>,
}

impl AssetFetcher {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            staging_dir: staging_dir.into(),
            credentials: None,
        }
    }

    /// Send HTTP basic auth with every media request
    pub fn with_basic_auth(mut self, credentials: AccountCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    async fn request(&self, url: &str) -> Result<Response, reqwest::Error> {
        let mut request = self.client.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.account_sid, Some(&creds.auth_token));
        }
        request.send().await?.error_for_status()
    }

    /// Download one recording to `{staging_dir}/{asset_id}{ext}`
    pub async fn fetch(
        &self,
        url: &str,
        call_sid: &str,
        asset_id: &str,
    ) -> Result<DownloadedAsset, FetchError> {
        let dual_url = dual_channel_url(url);
        debug!(url = %dual_url, "Requesting dual-channel rendition");

        let (response, source_url) = match self.request(&dual_url).await {
            Ok(response) => (response, dual_url),
            Err(e) => {
                warn!(
                    call_sid,
                    url = %dual_url,
                    error = %e,
                    "Dual-channel request failed, retrying without parameters"
                );
                let response = self.request(url).await.map_err(|source| FetchError::Request {
                    url: url.to_string(),
                    source,
                })?;
                (response, url.to_string())
            }
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let extension = AssetExtension::from_content_type(&content_type).ok_or_else(|| {
            FetchError::UnsupportedContentType {
                url: source_url.clone(),
                content_type: content_type.clone(),
            }
        })?;

        let path = self
            .staging_dir
            .join(format!("{}{}", asset_id, extension.as_str()));

        let bytes = self.write_body(response, &path, &source_url).await?;
        debug!(call_sid, path = %path.display(), bytes, "Recording downloaded");

        Ok(DownloadedAsset {
            call_sid: call_sid.to_string(),
            path,
            extension,
            source_url,
        })
    }

    /// Stream the body to disk. A partial file is removed on failure.
    async fn write_body(&self, response: Response, path: &Path, url: &str) -> Result<u64, FetchError> {
        let io_err = |source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.staging_dir).await.map_err(io_err)?;
        let mut file = File::create(path).await.map_err(io_err)?;

        match copy_body(response, &mut file, path, url).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %remove_err, "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn copy_body(response: Response, file: &mut File, path: &Path, url: &str) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Stream {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    file.sync_data().await.map_err(io_err)?;

    Ok(written)
}
