//! Release selection: turn a spec plus a candidate list into one version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{Channel, SpecKind, VersionSpec};
use crate::version::Version;

/// Release channel a feed reports for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Lts,
    Stable,
    Beta,
}

/// One release as reported by an upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCandidate {
    /// Concrete version, already stripped of feed prefixes (`v`, `go`)
    pub version: String,

    pub channel: ReleaseChannel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ReleaseCandidate {
    pub fn new(version: impl Into<String>, channel: ReleaseChannel) -> Self {
        Self {
            version: version.into(),
            channel,
            published_at: None,
        }
    }

    pub fn stable(version: impl Into<String>) -> Self {
        Self::new(version, ReleaseChannel::Stable)
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// How a resolved version was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMethod {
    ExactMatch,
    PartialToLatestPatch,
    SymbolicToConcrete,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::ExactMatch => "exact-match",
            ResolutionMethod::PartialToLatestPatch => "partial-to-latest-patch",
            ResolutionMethod::SymbolicToConcrete => "symbolic-to-concrete",
        }
    }
}

/// Output of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    /// Concrete version string
    pub version: String,

    /// The spec this was resolved from
    pub spec: VersionSpec,

    pub method: ResolutionMethod,

    /// Channel of the chosen candidate (absent for exact specs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ReleaseChannel>,
}

impl ResolvedVersion {
    /// Resolve an exact spec without consulting any candidates.
    pub fn exact(spec: &VersionSpec) -> Option<Self> {
        spec.is_exact().then(|| Self {
            version: spec.normalized.clone(),
            spec: spec.clone(),
            method: ResolutionMethod::ExactMatch,
            channel: None,
        })
    }
}

/// A feed entry that could not be parsed and was left out of selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub version: String,
    pub reason: String,
}

/// Result of [`select`]: the choice plus anything that was skipped on the way.
#[derive(Debug, Clone)]
pub struct Selection {
    pub resolved: ResolvedVersion,
    pub skipped: Vec<SkippedCandidate>,
}

/// Selection failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no release of {tool} matches '{spec}' ({considered} candidates considered)")]
    NoMatch {
        tool: String,
        spec: String,
        considered: usize,
        skipped: Vec<SkippedCandidate>,
    },
}

/// Parse and order candidates, highest precedence first.
///
/// Unparseable entries are returned separately instead of failing the whole
/// list.
pub fn rank(
    candidates: &[ReleaseCandidate],
) -> (Vec<(Version, &ReleaseCandidate)>, Vec<SkippedCandidate>) {
    let mut ranked = Vec::with_capacity(candidates.len());
    let mut skipped = Vec::new();

    for candidate in candidates {
        match Version::parse(&candidate.version) {
            Ok(version) => ranked.push((version, candidate)),
            Err(e) => skipped.push(SkippedCandidate {
                version: candidate.version.clone(),
                reason: e.to_string(),
            }),
        }
    }

    // Stable sort keeps feed order among equal versions.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    (ranked, skipped)
}

/// Pick the concrete release a spec refers to.
pub fn select(spec: &VersionSpec, candidates: &[ReleaseCandidate]) -> Result<Selection, SelectError> {
    if let Some(resolved) = ResolvedVersion::exact(spec) {
        return Ok(Selection {
            resolved,
            skipped: Vec::new(),
        });
    }

    let (ranked, skipped) = rank(candidates);
    let considered = ranked.len();

    let (method, chosen) = match &spec.kind {
        SpecKind::Partial { .. } => (
            ResolutionMethod::PartialToLatestPatch,
            ranked.iter().find(|(version, candidate)| {
                !is_prerelease(version, candidate) && crate::matches(&spec.normalized, &candidate.version)
            }),
        ),
        SpecKind::Symbolic { channel } => (
            ResolutionMethod::SymbolicToConcrete,
            ranked
                .iter()
                .find(|(version, candidate)| channel_accepts(*channel, version, candidate)),
        ),
        SpecKind::Exact => unreachable!("exact specs return early"),
    };

    match chosen {
        Some((_, candidate)) => Ok(Selection {
            resolved: ResolvedVersion {
                version: candidate.version.clone(),
                spec: spec.clone(),
                method,
                channel: Some(candidate.channel),
            },
            skipped,
        }),
        None => Err(SelectError::NoMatch {
            tool: spec.tool.clone(),
            spec: spec.raw.trim().to_string(),
            considered,
            skipped,
        }),
    }
}

fn is_prerelease(version: &Version, candidate: &ReleaseCandidate) -> bool {
    version.is_prerelease() || candidate.channel == ReleaseChannel::Beta
}

fn channel_accepts(channel: Channel, version: &Version, candidate: &ReleaseCandidate) -> bool {
    match channel {
        Channel::Beta => true,
        Channel::Stable | Channel::Latest => !is_prerelease(version, candidate),
        Channel::Lts => {
            candidate.channel == ReleaseChannel::Lts && !version.is_prerelease()
        }
    }
}
