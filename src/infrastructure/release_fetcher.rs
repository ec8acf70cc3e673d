//! HTTP access to the published release catalog

use crate::domain::releases::{ArtifactFetcher, ReleaseCatalog, ReleaseError, ReleaseManifest};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "releases.json";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `reqwest` backed fetcher for the manifest and firmware images
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ReleaseError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ReleaseError::Fetch(format!("HTTP client init failed: {e}")))?;
        Ok(Self { client })
    }

    /// Share an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `{base_url}/releases.json` and build a catalog from it
    pub async fn fetch_catalog(&self, base_url: &str) -> Result<ReleaseCatalog, ReleaseError> {
        let url = manifest_url(base_url);
        info!("Fetching release manifest from {}", url);
        let manifest: ReleaseManifest = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReleaseError::Fetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| ReleaseError::Fetch(format!("decoding {url}: {e}")))?;
        debug!(
            "Manifest lists {} releases, nightly: {}",
            manifest.releases.len(),
            manifest.nightly.is_some()
        );
        Ok(ReleaseCatalog::new(base_url, manifest))
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ReleaseError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReleaseError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReleaseError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn manifest_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), MANIFEST_FILE)
}
