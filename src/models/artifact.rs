//! Model artifact locations and fetching

use crate::error::StartupError;
use reqwest::{StatusCode, Url};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Where a model artifact is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Local filesystem path (bare path or `file://` URI)
    Local(PathBuf),
    /// HTTP(S) URL, e.g. a pre-signed object-store link
    Remote(Url),
}

impl ArtifactLocation {
    /// Parse a configured location string
    pub fn parse(raw: &str) -> Result<Self, StartupError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StartupError::UnsupportedLocation(raw.to_string()));
        }

        if let Some(path) = raw.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StartupError::UnsupportedLocation(raw.to_string()));
            }
            return Ok(ArtifactLocation::Local(PathBuf::from(path)));
        }

        if raw.contains("://") {
            let url = Url::parse(raw)
                .map_err(|_| StartupError::UnsupportedLocation(raw.to_string()))?;
            return match url.scheme() {
                "http" | "https" => Ok(ArtifactLocation::Remote(url)),
                _ => Err(StartupError::UnsupportedLocation(raw.to_string())),
            };
        }

        Ok(ArtifactLocation::Local(PathBuf::from(raw)))
    }

    /// Read the artifact bytes
    pub async fn fetch(&self, timeout: Duration) -> Result<Vec<u8>, StartupError> {
        let bytes = match self {
            ArtifactLocation::Local(path) => {
                debug!(path = %path.display(), "Reading model artifact");
                tokio::fs::read(path).await.map_err(|e| match e.kind() {
                    ErrorKind::NotFound => StartupError::ArtifactMissing(self.to_string()),
                    _ => StartupError::ArtifactRead {
                        location: self.to_string(),
                        source: e,
                    },
                })?
            }
            ArtifactLocation::Remote(url) => self.fetch_remote(url, timeout).await?,
        };

        info!(location = %self, bytes = bytes.len(), "Model artifact fetched");
        Ok(bytes)
    }

    async fn fetch_remote(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, StartupError> {
        let fetch_error = |reason: String| StartupError::ArtifactFetch {
            location: self.to_string(),
            reason,
        };

        debug!(url = %url, timeout_secs = timeout.as_secs(), "Downloading model artifact");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| fetch_error(e.to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(StartupError::ArtifactMissing(self.to_string())),
            status => return Err(fetch_error(format!("server responded with {}", status))),
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(body.to_vec())
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::Local(path) => write!(f, "{}", path.display()),
            // query strings may carry signatures
            ArtifactLocation::Remote(url) => {
                write!(f, "{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path())
            }
        }
    }
}
