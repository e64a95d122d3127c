//! Requested version specs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal strings that upstream lookups emit instead of a version when
/// something went wrong. They are never accepted as a spec.
pub const SENTINELS: &[&str] = &["null", "undefined", "error"];

/// Human-readable description of the accepted character set.
pub const ALLOWED_SPEC_CHARS: &str = "[0-9A-Za-z.-]";

/// Named release channel used by symbolic specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Highest non-pre-release version.
    Stable,
    /// Highest version including pre-releases.
    Beta,
    /// Alias of `Stable`.
    Latest,
    /// Highest long-term-support version.
    Lts,
}

impl Channel {
    /// Parse a channel name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Some(Channel::Stable),
            "beta" => Some(Channel::Beta),
            "latest" => Some(Channel::Latest),
            "lts" => Some(Channel::Lts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Latest => "latest",
            Channel::Lts => "lts",
        }
    }

    /// Whether candidates on a pre-release channel qualify.
    pub fn includes_prereleases(&self) -> bool {
        matches!(self, Channel::Beta)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a requested version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpecKind {
    /// Fully qualified version; no feed lookup needed.
    Exact,
    /// `major` or `major.minor`, resolved to the latest matching patch.
    Partial { major: u64, minor: Option<u64> },
    /// Channel name resolved against the feed.
    Symbolic { channel: Channel },
}

/// Errors for spec parsing. All of them are determinate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("version spec is empty")]
    Empty,

    #[error("version spec '{0}' is a sentinel value, not a version")]
    Sentinel(String),

    #[error("version spec '{spec}' contains {ch:?}, allowed characters are [0-9A-Za-z.-]")]
    InvalidCharacter { spec: String, ch: char },

    #[error("version spec '{0}' has an empty segment")]
    EmptySegment(String),

    #[error("version spec '{0}' is neither numeric nor a known channel")]
    Unrecognized(String),
}

/// A validated version request for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Tool or language identifier the spec applies to
    pub tool: String,

    /// The string exactly as requested
    pub raw: String,

    /// Matching form: trimmed, leading `v` removed, channels lowercased
    pub normalized: String,

    /// Parsed shape
    #[serde(flatten)]
    pub kind: SpecKind,
}

impl VersionSpec {
    /// Parse and validate a raw spec.
    ///
    /// Validation runs before anything else so that malformed upstream data
    /// (`"null"`, shell fragments, paths) can never reach a URL or file name.
    pub fn parse(tool: impl Into<String>, raw: &str) -> Result<Self, SpecError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SpecError::Empty);
        }

        if SENTINELS
            .iter()
            .any(|s| trimmed.eq_ignore_ascii_case(s))
        {
            return Err(SpecError::Sentinel(trimmed.to_string()));
        }

        if let Some(ch) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
        {
            return Err(SpecError::InvalidCharacter {
                spec: trimmed.to_string(),
                ch,
            });
        }

        let tool = tool.into();

        if let Some(channel) = Channel::parse(trimmed) {
            return Ok(Self {
                tool,
                raw: raw.to_string(),
                normalized: channel.as_str().to_string(),
                kind: SpecKind::Symbolic { channel },
            });
        }

        let normalized = strip_v_prefix(trimmed);
        let (core, pre) = match normalized.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (normalized, None),
        };

        if pre.is_some_and(|p| p.is_empty() || p.split('.').any(str::is_empty)) {
            return Err(SpecError::EmptySegment(trimmed.to_string()));
        }

        let mut numbers = Vec::new();
        for segment in core.split('.') {
            if segment.is_empty() {
                return Err(SpecError::EmptySegment(trimmed.to_string()));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SpecError::Unrecognized(trimmed.to_string()));
            }
            let n: u64 = segment
                .parse()
                .map_err(|_| SpecError::Unrecognized(trimmed.to_string()))?;
            numbers.push(n);
        }

        let kind = if pre.is_some() || numbers.len() >= 3 {
            SpecKind::Exact
        } else {
            SpecKind::Partial {
                major: numbers[0],
                minor: numbers.get(1).copied(),
            }
        };

        Ok(Self {
            tool,
            raw: raw.to_string(),
            normalized: normalized.to_string(),
            kind,
        })
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.kind, SpecKind::Exact)
    }

    /// Whether a concrete version satisfies this spec's constraint.
    ///
    /// Symbolic specs accept any concrete version; the channel only decides
    /// which one is picked.
    pub fn accepts(&self, version: &str) -> bool {
        match &self.kind {
            SpecKind::Exact => version == self.normalized,
            SpecKind::Partial { .. } => crate::matches(&self.normalized, version),
            SpecKind::Symbolic { .. } => true,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tool, self.raw.trim())
    }
}

fn strip_v_prefix(s: &str) -> &str {
    match s.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => s,
    }
}
