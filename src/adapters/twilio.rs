//! Twilio REST adapter for listing call recordings.
//!
//! Uses the 2010-04-01 Recordings list endpoint:
//! `GET /2010-04-01/Accounts/{AccountSid}/Recordings.json?CallSid=..&PageSize=..`
//! with HTTP basic auth. Only the first page is read.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::RecordingSource;

/// Default API host
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Errors from the recordings API
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twilio API error {status}: {message}")]
    Api { status: u16, message: String },
}

/// Credentials for one account context
#[derive(Clone)]
pub struct AccountCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .finish()
    }
}

impl AccountCredentials {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Environment variable names for a profile.
    ///
    /// No profile reads `TWILIO_ACCOUNT_SID`/`TWILIO_AUTH_TOKEN`; profile
    /// `closers` reads `TWILIO_ACCOUNT_SID_CLOSERS`/`TWILIO_AUTH_TOKEN_CLOSERS`.
    pub fn env_keys(profile: Option<&str>) -> (String, String) {
        match profile {
            Some(p) if !p.is_empty() => {
                let suffix = p.to_ascii_uppercase().replace('-', "_");
                (
                    format!("TWILIO_ACCOUNT_SID_{}", suffix),
                    format!("TWILIO_AUTH_TOKEN_{}", suffix),
                )
            }
            _ => (
                "TWILIO_ACCOUNT_SID".to_string(),
                "TWILIO_AUTH_TOKEN".to_string(),
            ),
        }
    }

    /// Load the active profile's credentials from the environment
    pub fn from_env(profile: Option<&str>) -> Result<Self, ResolveError> {
        let (sid_key, token_key) = Self::env_keys(profile);
        let account_sid =
            std::env::var(&sid_key).map_err(|_| ResolveError::MissingCredentials(sid_key))?;
        let auth_token =
            std::env::var(&token_key).map_err(|_| ResolveError::MissingCredentials(token_key))?;
        Ok(Self::new(account_sid, auth_token))
    }
}

/// One page of the Recordings list response
#[derive(Debug, Deserialize)]
pub struct RecordingPage {
    #[serde(default)]
    pub recordings: Vec<RecordingResource>,
}

/// A recording resource as returned by the API
#[derive(Debug, Deserialize)]
pub struct RecordingResource {
    pub sid: String,

    #[serde(default)]
    pub call_sid: Option<String>,

    /// Resource URI, e.g. `/2010-04-01/Accounts/AC../Recordings/RE...json`
    #[serde(default)]
    pub uri: Option<String>,

    /// Direct media location, when the API provides one
    #[serde(default)]
    pub media_url: Option<String>,
}

impl RecordingResource {
    /// Media URL: `media_url` if present, else derived from `uri`
    pub fn media_location(&self, api_base: &str) -> Option<String> {
        if let Some(url) = self.media_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }

        let uri = self.uri.as_deref()?;
        let path = uri.strip_suffix(".json").unwrap_or(uri);
        Some(format!("{}{}", api_base.trim_end_matches('/'), path))
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Twilio recordings client
pub struct TwilioClient {
    credentials: AccountCredentials,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(credentials: AccountCredentials) -> Self {
        Self::with_api_base(credentials, DEFAULT_API_BASE)
    }

    /// Client against a non-default API host (regional edge, test server)
    pub fn with_api_base(credentials: AccountCredentials, api_base: impl Into<String>) -> Self {
        Self {
            credentials,
            api_base: api_base.into(),
            client: reqwest::Client::new(),
        }
    }

    fn recordings_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Recordings.json",
            self.api_base.trim_end_matches('/'),
            self.credentials.account_sid
        )
    }

    /// Fetch the first page of recordings for a call
    pub async fn fetch_recordings(
        &self,
        call_sid: &str,
        page_limit: u32,
    ) -> Result<RecordingPage, ResolveError> {
        let page_size = page_limit.to_string();
        let response = self
            .client
            .get(self.recordings_url())
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .query(&[("CallSid", call_sid), ("PageSize", page_size.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(ApiErrorBody {
                    code: Some(code),
                    message: Some(message),
                }) => format!("{} (code {})", message, code),
                Ok(ApiErrorBody {
                    message: Some(message),
                    ..
                }) => message,
                _ => body,
            };
            return Err(ResolveError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<RecordingPage>().await?)
    }
}

#[async_trait]
impl RecordingSource for TwilioClient {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn list_recordings(
        &self,
        call_sid: &str,
        page_limit: u32,
    ) -> Result<Vec<String>, ResolveError> {
        let page = self.fetch_recordings(call_sid, page_limit).await?;

        let urls = page
            .recordings
            .iter()
            .take(page_limit as usize)
            .filter_map(|r| {
                let url = r.media_location(&self.api_base);
                if url.is_none() {
                    tracing::warn!(call_sid, recording = %r.sid, "Recording has no media location");
                }
                url
            })
            .collect();

        Ok(urls)
    }
}
