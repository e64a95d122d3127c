//! Per-invocation context: transport, retrier and feed cache

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use toolpin_version::ReleaseCandidate;
use url::Url;

use crate::feed::{FeedCache, FeedClient, FeedError, FeedResult};
use crate::http::{HttpClient, HttpError};
use crate::retry::{Retrier, RetryError, RetryPolicy};

/// Owned state for one invocation. Never shared across invocations.
pub struct Session {
    http: Arc<dyn HttpClient>,
    retrier: Retrier,
    feeds: FeedCache,
}

impl Session {
    pub fn new(http: Arc<dyn HttpClient>, retrier: Retrier, feed_ttl: Duration) -> Self {
        Self {
            http,
            retrier,
            feeds: FeedCache::new(feed_ttl),
        }
    }

    /// Session with the default retry policy and feed TTL.
    pub fn with_client(http: Arc<dyn HttpClient>) -> Self {
        Self::new(
            http,
            Retrier::new(RetryPolicy::default()),
            crate::feed::DEFAULT_FEED_TTL,
        )
    }

    pub fn retrier(&self) -> &Retrier {
        &self.retrier
    }

    pub fn feed_cache(&self) -> &FeedCache {
        &self.feeds
    }

    /// GET a document, retrying transient failures.
    pub fn fetch(&mut self, operation: &str, url: &Url) -> Result<Vec<u8>, RetryError<HttpError>> {
        let http = Arc::clone(&self.http);
        self.retrier.run(operation, |_| http.get(url))
    }

    /// Like [`fetch`](Self::fetch), but a 404 is `Ok(None)`.
    pub fn fetch_optional(
        &mut self,
        operation: &str,
        url: &Url,
    ) -> Result<Option<Vec<u8>>, RetryError<HttpError>> {
        match self.fetch(operation, url) {
            Ok(body) => Ok(Some(body)),
            Err(RetryError::Determinate { error, .. }) if error.is_not_found() => {
                tracing::debug!(url = %url, "not published");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stream `url` into a writer, retrying transient failures. `open` is
    /// called once per attempt and must hand back a fresh, empty sink; the
    /// sink of the successful attempt is returned with the byte count.
    pub fn download<W, F>(
        &mut self,
        operation: &str,
        url: &Url,
        mut open: F,
    ) -> Result<(W, u64), RetryError<HttpError>>
    where
        W: Write,
        F: FnMut() -> io::Result<W>,
    {
        let http = Arc::clone(&self.http);
        self.retrier.run(operation, |attempt| {
            let mut sink = open().map_err(|e| HttpError::Write {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            if attempt > 1 {
                tracing::debug!(url = %url, attempt, "restarting download");
            }
            let written = http.download(url, &mut sink)?;
            Ok((sink, written))
        })
    }

    /// Release candidates from `feed`, served from the cache while fresh.
    pub fn releases(&mut self, feed: &dyn FeedClient) -> FeedResult<Vec<ReleaseCandidate>> {
        let url = feed.source_url();
        let key = url.to_string();

        if let Some(candidates) = self.feeds.get(&key) {
            tracing::debug!(feed = %feed.name(), "feed cache hit");
            return Ok(candidates);
        }

        tracing::info!(feed = %feed.name(), url = %url, "fetching release feed");
        let body = self
            .fetch(&format!("feed {}", feed.name()), &url)
            .map_err(FeedError::Unreachable)?;
        let candidates = feed.parse(&body)?;
        tracing::debug!(feed = %feed.name(), candidates = candidates.len(), "feed parsed");

        self.feeds.insert(key, candidates.clone());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::NodeIndexFeed;
    use crate::http::MockHttp;
    use crate::retry::NoSleep;

    fn session(mock: &Arc<MockHttp>) -> Session {
        let retrier = Retrier::new(RetryPolicy::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ))
        .with_sleeper(NoSleep);
        Session::new(mock.clone(), retrier, Duration::from_secs(60))
    }

    #[test]
    fn test_releases_cached() {
        let mock = Arc::new(MockHttp::new());
        mock.respond(
            crate::feed::NODE_INDEX_URL,
            r#"[{"version":"v22.18.0","lts":"Jod"}]"#,
        );
        let mut session = session(&mock);

        let first = session.releases(&NodeIndexFeed).unwrap();
        let second = session.releases(&NodeIndexFeed).unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.request_count(), 1);
        assert_eq!(session.feed_cache().stats().hits, 1);
    }

    #[test]
    fn test_feed_retries_then_gives_up() {
        let mock = Arc::new(MockHttp::new());
        let url = crate::feed::NODE_INDEX_URL;
        mock.fail(
            url,
            HttpError::Status {
                url: url.to_string(),
                status: 502,
            },
        );
        let mut session = session(&mock);

        let err = session.releases(&NodeIndexFeed).unwrap_err();
        assert!(matches!(err, FeedError::Unreachable(ref e) if e.attempts() == 3));
        assert_eq!(mock.request_count(), 3);
    }

    #[test]
    fn test_fetch_optional_not_found() {
        let mock = Arc::new(MockHttp::new());
        let mut session = session(&mock);
        let url = Url::parse("https://example.test/SHASUMS256.txt").unwrap();
        assert_eq!(session.fetch_optional("sums", &url).unwrap(), None);
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_download_retry_restarts_file() {
        let mock = Arc::new(MockHttp::new());
        let url = "https://example.test/tool.tar.gz";
        mock.respond(url, "payload").fail_times(
            url,
            1,
            HttpError::Connection {
                url: url.to_string(),
                reason: "reset".into(),
            },
        );
        let mut session = session(&mock);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tool.partial");
        std::fs::write(&path, "stale bytes").unwrap();

        let mut opened = 0;
        let (file, written) = session
            .download("download", &Url::parse(url).unwrap(), || {
                opened += 1;
                std::fs::File::create(&path)
            })
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(opened, 2);
        drop(file);
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }
}
