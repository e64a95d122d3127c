//! Feed-backed version resolution
//!
//! Parsing and selection are pure and live in `toolpin-version`; this module
//! adds the registry lookup and the feed fetch. Specs are validated before
//! anything touches the network, and exact specs never reach the feed.

use toolpin_version::{select, ResolvedVersion, SelectError, Selection, SpecError, VersionSpec};

use crate::error::ErrorKind;
use crate::feed::FeedError;
use crate::registry::{RegistryError, ToolRegistry};
use crate::session::Session;

/// Resolution failures
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{tool}: invalid version spec: {source}")]
    InvalidSpec {
        tool: String,
        #[source]
        source: SpecError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{tool}: '{spec}' is not an exact version and {tool} has no release feed")]
    NoFeed { tool: String, spec: String },

    #[error("{tool}@{spec}: {source}")]
    Feed {
        tool: String,
        spec: String,
        #[source]
        source: FeedError,
    },

    #[error(transparent)]
    NoMatch(#[from] SelectError),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::InvalidSpec { .. } | ResolveError::Registry(_) | ResolveError::NoFeed { .. } => {
                ErrorKind::InvalidSpec
            }
            ResolveError::Feed { .. } => ErrorKind::Network,
            ResolveError::NoMatch(_) => ErrorKind::NoMatch,
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Resolves `(tool, spec)` pairs against the registry's feeds
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a raw spec string for `tool`.
    pub fn resolve(&self, session: &mut Session, tool: &str, raw: &str) -> ResolveResult<Selection> {
        let spec = VersionSpec::parse(tool, raw).map_err(|source| ResolveError::InvalidSpec {
            tool: tool.to_string(),
            source,
        })?;
        self.resolve_spec(session, &spec)
    }

    /// Resolve an already-parsed spec.
    pub fn resolve_spec(&self, session: &mut Session, spec: &VersionSpec) -> ResolveResult<Selection> {
        let provider = self.registry.get(&spec.tool)?;

        if let Some(resolved) = ResolvedVersion::exact(spec) {
            tracing::debug!(tool = %spec.tool, version = %resolved.version, "exact spec, feed not consulted");
            return Ok(Selection {
                resolved,
                skipped: Vec::new(),
            });
        }

        let feed = provider.feed().ok_or_else(|| ResolveError::NoFeed {
            tool: spec.tool.clone(),
            spec: spec.raw.clone(),
        })?;

        let candidates = session.releases(feed).map_err(|source| ResolveError::Feed {
            tool: spec.tool.clone(),
            spec: spec.raw.clone(),
            source,
        })?;

        let selection = select(spec, &candidates).map_err(|e| {
            let SelectError::NoMatch { skipped, .. } = &e;
            log_skipped(&spec.tool, skipped);
            e
        })?;
        log_skipped(&spec.tool, &selection.skipped);

        tracing::info!(
            tool = %spec.tool,
            spec = %spec.raw,
            version = %selection.resolved.version,
            method = selection.resolved.method.as_str(),
            "resolved"
        );
        Ok(selection)
    }

    /// Resolve and keep only the concrete version.
    pub fn resolve_version(&self, session: &mut Session, tool: &str, raw: &str) -> ResolveResult<ResolvedVersion> {
        self.resolve(session, tool, raw).map(|s| s.resolved)
    }
}

fn log_skipped(tool: &str, skipped: &[toolpin_version::SkippedCandidate]) {
    for candidate in skipped {
        tracing::warn!(
            tool,
            version = %candidate.version,
            reason = %candidate.reason,
            "skipping malformed release"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::NODE_INDEX_URL;
    use crate::http::{HttpError, MockHttp};
    use crate::retry::{NoSleep, Retrier, RetryPolicy};
    use std::sync::Arc;
    use std::time::Duration;
    use toolpin_version::ResolutionMethod;

    fn session(mock: &Arc<MockHttp>) -> Session {
        let retrier = Retrier::new(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO)).with_sleeper(NoSleep);
        Session::new(mock.clone(), retrier, Duration::from_secs(60))
    }

    fn node_index(mock: &MockHttp) {
        mock.respond(
            NODE_INDEX_URL,
            r#"[
                {"version":"v24.4.1","lts":false},
                {"version":"v22.18.0","lts":"Jod"},
                {"version":"v22.9.0","lts":"Jod"},
                {"version":"vnull","lts":false},
                {"version":"v21.7.3","lts":false}
            ]"#,
        );
    }

    #[test]
    fn test_exact_spec_makes_no_requests() {
        let mock = Arc::new(MockHttp::new());
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);

        let resolved = Resolver::new(&registry)
            .resolve_version(&mut session, "node", "v22.18.0")
            .unwrap();
        assert_eq!(resolved.version, "22.18.0");
        assert_eq!(resolved.method, ResolutionMethod::ExactMatch);
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_invalid_spec_makes_no_requests() {
        let mock = Arc::new(MockHttp::new());
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);
        let resolver = Resolver::new(&registry);

        for raw in ["null", "Undefined", "ERROR", "22;rm", "", "1..2"] {
            let err = resolver.resolve(&mut session, "node", raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSpec, "{raw}");
        }
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_unknown_tool_is_invalid_input() {
        let mock = Arc::new(MockHttp::new());
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);
        let err = Resolver::new(&registry)
            .resolve(&mut session, "terraform", "1.9")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_partial_and_symbolic_via_feed() {
        let mock = Arc::new(MockHttp::new());
        node_index(&mock);
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);
        let resolver = Resolver::new(&registry);

        let selection = resolver.resolve(&mut session, "node", "22").unwrap();
        assert_eq!(selection.resolved.version, "22.18.0");
        assert_eq!(selection.skipped.len(), 1);

        let lts = resolver.resolve_version(&mut session, "node", "lts").unwrap();
        assert_eq!(lts.version, "22.18.0");

        let latest = resolver.resolve_version(&mut session, "node", "latest").unwrap();
        assert_eq!(latest.version, "24.4.1");

        // One fetch, then cache hits
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_no_match() {
        let mock = Arc::new(MockHttp::new());
        node_index(&mock);
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);
        let err = Resolver::new(&registry)
            .resolve(&mut session, "node", "2")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoMatch);
    }

    #[test]
    fn test_feed_down_is_network() {
        let mock = Arc::new(MockHttp::new());
        mock.fail(
            NODE_INDEX_URL,
            HttpError::Timeout {
                url: NODE_INDEX_URL.to_string(),
            },
        );
        let registry = ToolRegistry::builtin();
        let mut session = session(&mock);
        let err = Resolver::new(&registry)
            .resolve(&mut session, "node", "22")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(mock.request_count(), 2);
    }
}
