//! nodejs.org distribution index

use serde::Deserialize;
use serde_json::Value;
use toolpin_version::{ReleaseCandidate, ReleaseChannel};
use url::Url;

use super::{malformed, parse_date, static_url, strip_v, FeedClient, FeedResult};

pub const NODE_INDEX_URL: &str = "https://nodejs.org/dist/index.json";

#[derive(Debug, Deserialize)]
struct NodeRelease {
    version: String,
    #[serde(default)]
    date: Option<String>,
    /// `false`, or the LTS codename
    #[serde(default)]
    lts: Value,
}

#[derive(Debug, Clone, Default)]
pub struct NodeIndexFeed;

impl FeedClient for NodeIndexFeed {
    fn name(&self) -> String {
        "nodejs.org/dist".to_string()
    }

    fn source_url(&self) -> Url {
        static_url(NODE_INDEX_URL)
    }

    fn parse(&self, body: &[u8]) -> FeedResult<Vec<ReleaseCandidate>> {
        let releases: Vec<NodeRelease> =
            serde_json::from_slice(body).map_err(|e| malformed(&self.source_url(), e))?;

        Ok(releases
            .into_iter()
            .map(|release| {
                let channel = match release.lts {
                    Value::String(_) | Value::Bool(true) => ReleaseChannel::Lts,
                    _ => ReleaseChannel::Stable,
                };
                let mut candidate = ReleaseCandidate::new(strip_v(&release.version), channel);
                candidate.published_at = release.date.as_deref().and_then(parse_date);
                candidate
            })
            .collect())
    }
}
