//! endoflife.date product feed
//!
//! `https://endoflife.date/api/{product}.json` lists one object per release
//! cycle with its latest patch. `lts` is either a boolean or the date the
//! cycle entered LTS.

use serde::Deserialize;
use serde_json::Value;
use toolpin_version::{ReleaseCandidate, ReleaseChannel};
use url::Url;

use super::{malformed, parse_date, static_url, FeedClient, FeedResult};

pub const ENDOFLIFE_API: &str = "https://endoflife.date/api/";

#[derive(Debug, Deserialize)]
struct Cycle {
    #[serde(default)]
    latest: Value,
    #[serde(default)]
    lts: Value,
    #[serde(default, rename = "latestReleaseDate")]
    latest_release_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EndOfLifeFeed {
    product: String,
}

impl EndOfLifeFeed {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FeedClient for EndOfLifeFeed {
    fn name(&self) -> String {
        format!("endoflife.date/{}", self.product)
    }

    fn source_url(&self) -> Url {
        let mut url = static_url(ENDOFLIFE_API);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&format!("{}.json", self.product));
        }
        url
    }

    fn parse(&self, body: &[u8]) -> FeedResult<Vec<ReleaseCandidate>> {
        let cycles: Vec<Cycle> =
            serde_json::from_slice(body).map_err(|e| malformed(&self.source_url(), e))?;

        Ok(cycles
            .into_iter()
            .map(|cycle| {
                // Unusable `latest` values are kept as-is so the resolver can
                // report them as skipped.
                let version = scalar_to_string(&cycle.latest).unwrap_or_else(|| cycle.latest.to_string());
                let channel = match cycle.lts {
                    Value::Bool(true) | Value::String(_) => ReleaseChannel::Lts,
                    _ => ReleaseChannel::Stable,
                };
                let mut candidate = ReleaseCandidate::new(version, channel);
                candidate.published_at = cycle.latest_release_date.as_deref().and_then(parse_date);
                candidate
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON: &str = r#"[
        {"cycle":"3.13","releaseDate":"2024-10-07","eol":"2029-10-31","latest":"3.13.0","latestReleaseDate":"2024-10-07","lts":false},
        {"cycle":"3.12","releaseDate":"2023-10-02","eol":"2028-10-31","latest":"3.12.7","latestReleaseDate":"2024-10-01","lts":false},
        {"cycle":"3.11","releaseDate":"2022-10-24","eol":"2027-10-31","latest":"3.11.9","latestReleaseDate":"2024-04-02","lts":false}
    ]"#;

    #[test]
    fn test_source_url() {
        let feed = EndOfLifeFeed::new("python");
        assert_eq!(
            feed.source_url().as_str(),
            "https://endoflife.date/api/python.json"
        );
    }

    #[test]
    fn test_parse_python_cycles() {
        let feed = EndOfLifeFeed::new("python");
        let candidates = feed.parse(PYTHON.as_bytes()).unwrap();
        let versions: Vec<_> = candidates.iter().map(|c| c.version.as_str()).collect();
        assert_eq!(versions, vec!["3.13.0", "3.12.7", "3.11.9"]);
        assert!(candidates.iter().all(|c| c.channel == ReleaseChannel::Stable));
        assert!(candidates[1].published_at.is_some());
    }

    #[test]
    fn test_lts_as_date() {
        let feed = EndOfLifeFeed::new("nodejs");
        let body = br#"[{"cycle":"22","latest":"22.18.0","lts":"2024-10-29"},{"cycle":"23","latest":"23.11.1","lts":false}]"#;
        let candidates = feed.parse(body).unwrap();
        assert_eq!(candidates[0].channel, ReleaseChannel::Lts);
        assert_eq!(candidates[1].channel, ReleaseChannel::Stable);
    }

    #[test]
    fn test_malformed_document() {
        let feed = EndOfLifeFeed::new("python");
        assert!(feed.parse(b"{\"error\":true}").is_err());
    }
}
