//! Artifact downloads (installer scripts, helper archives).

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::FetchError;

/// Downloads a URL to a local file.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Fetches over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        info!(url = %url, dest = %dest.display(), "Downloading artifact");

        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?
            .bytes()
            .await
            .map_err(http_err)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;

        info!(url = %url, bytes = bytes.len(), "Artifact downloaded");
        Ok(bytes.len() as u64)
    }
}
