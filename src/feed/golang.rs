//! go.dev download index
//!
//! The index doubles as the Go publisher digest source: every file entry
//! carries its sha256.

use serde::{Deserialize, Serialize};
use toolpin_version::{ReleaseCandidate, ReleaseChannel};
use url::Url;

use super::{malformed, static_url, FeedClient, FeedResult};

pub const GO_INDEX_URL: &str = "https://go.dev/dl/?mode=json&include=all";

/// One file of a Go release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoFile {
    pub filename: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub kind: String,
}

/// One Go release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoRelease {
    /// Tag form, `go1.23.1`
    pub version: String,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<GoFile>,
}

impl GoRelease {
    pub fn parse_index(body: &[u8]) -> Result<Vec<GoRelease>, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn file(&self, filename: &str) -> Option<&GoFile> {
        self.files.iter().find(|f| f.filename == filename)
    }
}

/// `go1.24rc1` → `1.24-rc1`, `go1.23.1` → `1.23.1`.
pub fn go_version(tag: &str) -> String {
    let bare = tag.strip_prefix("go").unwrap_or(tag);
    match bare.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) if i > 0 => format!("{}-{}", &bare[..i], &bare[i..]),
        _ => bare.to_string(),
    }
}

/// Inverse of [`go_version`]: `1.24-rc1` → `go1.24rc1`.
pub fn go_tag(version: &str) -> String {
    format!("go{}", version.replacen('-', "", 1))
}

#[derive(Debug, Clone, Default)]
pub struct GoDownloadFeed;

impl FeedClient for GoDownloadFeed {
    fn name(&self) -> String {
        "go.dev/dl".to_string()
    }

    fn source_url(&self) -> Url {
        static_url(GO_INDEX_URL)
    }

    fn parse(&self, body: &[u8]) -> FeedResult<Vec<ReleaseCandidate>> {
        let releases = GoRelease::parse_index(body).map_err(|e| malformed(&self.source_url(), e))?;

        Ok(releases
            .into_iter()
            .map(|release| {
                let channel = if release.stable {
                    ReleaseChannel::Stable
                } else {
                    ReleaseChannel::Beta
                };
                ReleaseCandidate::new(go_version(&release.version), channel)
            })
            .collect())
    }
}
