//! Release catalog
//!
//! Model of the published `releases.json` manifest plus the ordering and
//! artifact resolution used by the "flash release" actions. Fetching bytes
//! is delegated to an [`ArtifactFetcher`].

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Release {0} doesn't exist")]
    UnknownRelease(String),

    #[error("Release {release} doesn't exist for board {board}")]
    UnknownBoard { release: String, board: String },

    #[error("manifest lists no releases")]
    NoReleases,

    #[error("manifest has no nightly build")]
    NoNightly,

    #[error("invalid release manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("artifact download failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    pub filename: String,
    #[serde(default)]
    pub boards: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NightlyEntry {
    pub date: String,
    pub version: String,
    pub filename: String,
    #[serde(default)]
    pub boards: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub releases: BTreeMap<String, ReleaseEntry>,
    #[serde(default)]
    pub nightly: Option<NightlyEntry>,
}

/// One published release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub date: Option<String>,
    pub filename: String,
    pub boards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyInfo {
    pub date: String,
    pub version: String,
}

/// Which build a flash action should use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSelection {
    Latest,
    Nightly,
    Version(String),
}

/// A resolved download location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub version: String,
    pub url: String,
}

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ReleaseError>;
}

#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    base_url: String,
    manifest: ReleaseManifest,
}

impl ReleaseCatalog {
    pub fn new(base_url: impl Into<String>, manifest: ReleaseManifest) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            manifest,
        }
    }

    pub fn from_json(base_url: impl Into<String>, json: &str) -> Result<Self, ReleaseError> {
        let manifest: ReleaseManifest = serde_json::from_str(json)?;
        Ok(Self::new(base_url, manifest))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// All releases, oldest first
    pub fn list_releases(&self) -> Vec<Release> {
        let mut releases: Vec<Release> = self
            .manifest
            .releases
            .iter()
            .map(|(version, entry)| Release {
                version: version.clone(),
                date: entry.date.clone(),
                filename: entry.filename.clone(),
                boards: entry.boards.clone(),
            })
            .collect();
        releases.sort_by(|a, b| compare_versions(&a.version, &b.version));
        releases
    }

    pub fn latest_release(&self) -> Option<Release> {
        self.list_releases().pop()
    }

    pub fn nightly(&self) -> Option<NightlyInfo> {
        self.manifest.nightly.as_ref().map(|n| NightlyInfo {
            date: n.date.clone(),
            version: n.version.clone(),
        })
    }

    /// Resolve a selection for a board into a download URL
    pub fn resolve(
        &self,
        selection: &ReleaseSelection,
        board: &str,
    ) -> Result<Artifact, ReleaseError> {
        let (label, version, filename, boards) = match selection {
            ReleaseSelection::Nightly => {
                let nightly = self.manifest.nightly.as_ref().ok_or(ReleaseError::NoNightly)?;
                (
                    "nightly".to_string(),
                    nightly.version.clone(),
                    &nightly.filename,
                    &nightly.boards,
                )
            }
            ReleaseSelection::Latest => {
                let version = self
                    .latest_release()
                    .map(|r| r.version)
                    .ok_or(ReleaseError::NoReleases)?;
                let entry = &self.manifest.releases[&version];
                (version.clone(), version, &entry.filename, &entry.boards)
            }
            ReleaseSelection::Version(version) => {
                let entry = self
                    .manifest
                    .releases
                    .get(version)
                    .ok_or_else(|| ReleaseError::UnknownRelease(version.clone()))?;
                (version.clone(), version.clone(), &entry.filename, &entry.boards)
            }
        };

        if !boards.iter().any(|b| b == board) {
            return Err(ReleaseError::UnknownBoard {
                release: label,
                board: board.to_string(),
            });
        }

        Ok(Artifact {
            version,
            url: format!("{}/{}/{}", self.base_url, board, filename),
        })
    }

    /// Download the firmware image for a selection and board
    pub async fn fetch_artifact(
        &self,
        fetcher: &dyn ArtifactFetcher,
        selection: &ReleaseSelection,
        board: &str,
    ) -> Result<(Artifact, Vec<u8>), ReleaseError> {
        let artifact = self.resolve(selection, board)?;
        info!("Fetching URL \"{}\"...", artifact.url);
        let bytes = fetcher.fetch(&artifact.url).await?;
        info!("Downloaded {} bytes", bytes.len());
        Ok((artifact, bytes))
    }
}

/// Compare dotted version strings segment by segment, numerically where
/// both segments are numbers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.trim_start_matches('v')
            .split(['.', '-', '+'])
            .map(str::to_string)
            .collect()
    };
    let left = split(a);
    let right = split(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}
