//! GitHub releases feed
//!
//! Reads the first page (100 entries) of `GET /repos/{owner}/{repo}/releases`.
//! Drafts are dropped; releases flagged `prerelease` land on the beta channel.

use serde::Deserialize;
use toolpin_version::{ReleaseCandidate, ReleaseChannel};
use url::Url;

use super::{malformed, parse_date, static_url, strip_v, FeedClient, FeedResult};

pub const GITHUB_API: &str = "https://api.github.com/";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitHubReleasesFeed {
    owner: String,
    repo: String,
}

impl GitHubReleasesFeed {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl FeedClient for GitHubReleasesFeed {
    fn name(&self) -> String {
        format!("github.com/{}/{}", self.owner, self.repo)
    }

    fn source_url(&self) -> Url {
        let mut url = static_url(GITHUB_API);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str(), "releases"]);
        }
        url.query_pairs_mut().append_pair("per_page", "100");
        url
    }

    fn parse(&self, body: &[u8]) -> FeedResult<Vec<ReleaseCandidate>> {
        let releases: Vec<Release> =
            serde_json::from_slice(body).map_err(|e| malformed(&self.source_url(), e))?;

        Ok(releases
            .into_iter()
            .filter(|r| !r.draft)
            .map(|release| {
                let channel = if release.prerelease {
                    ReleaseChannel::Beta
                } else {
                    ReleaseChannel::Stable
                };
                let mut candidate = ReleaseCandidate::new(strip_v(&release.tag_name), channel);
                candidate.published_at = release.published_at.as_deref().and_then(parse_date);
                candidate
            })
            .collect())
    }
}
