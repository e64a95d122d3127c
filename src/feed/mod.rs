//! Upstream version feeds
//!
//! A feed names the metadata document it reads and knows how to turn that
//! document into [`ReleaseCandidate`]s. Fetching, retrying and caching are the
//! [`Session`](crate::session::Session)'s job, so feeds stay pure and are
//! tested on canned payloads.

mod cache;
mod endoflife;
mod github;
mod golang;
mod nodejs;

pub use cache::{CacheStats, FeedCache, DEFAULT_FEED_TTL};
pub use endoflife::{EndOfLifeFeed, ENDOFLIFE_API};
pub use github::{GitHubReleasesFeed, GITHUB_API};
pub use golang::{go_tag, go_version, GoDownloadFeed, GoFile, GoRelease, GO_INDEX_URL};
pub use nodejs::{NodeIndexFeed, NODE_INDEX_URL};

use toolpin_version::ReleaseCandidate;
use url::Url;

use crate::http::HttpError;
use crate::retry::RetryError;

/// Feed failures
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("release feed unreachable: {0}")]
    Unreachable(#[from] RetryError<HttpError>),

    #[error("release feed {url} returned malformed data: {reason}")]
    Malformed { url: String, reason: String },
}

pub type FeedResult<T> = Result<T, FeedError>;

/// A source of release metadata for one tool
pub trait FeedClient: Send + Sync {
    /// Short name for logs (`endoflife.date/python`)
    fn name(&self) -> String;

    /// The document this feed reads
    fn source_url(&self) -> Url;

    /// Parse the document into candidates, in feed order.
    fn parse(&self, body: &[u8]) -> FeedResult<Vec<ReleaseCandidate>>;
}

pub(crate) fn malformed(url: &Url, reason: impl ToString) -> FeedError {
    FeedError::Malformed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a compile-time constant URL.
pub(crate) fn static_url(s: &'static str) -> Url {
    Url::parse(s).expect("constant URL is valid")
}

/// Strip a single leading `v` in front of a digit.
pub(crate) fn strip_v(tag: &str) -> &str {
    match tag.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => tag,
    }
}

/// Parse `YYYY-MM-DD` or RFC 3339 into a UTC timestamp.
pub(crate) fn parse_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
