//! Concrete version values with numeric precedence.

use std::cmp::Ordering;
use std::fmt;

/// A concrete release version: dot-separated numeric core plus an optional
/// pre-release tag (`1.85.0-beta.1`). Build metadata after `+` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    segments: Vec<u64>,
    pre: Option<String>,
}

/// Why a candidate string could not be read as a version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("segment '{segment}' of '{version}' is not numeric")]
    NonNumeric { version: String, segment: String },

    #[error("'{0}' has an empty segment")]
    EmptySegment(String),
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let without_build = s.split_once('+').map_or(s, |(v, _)| v);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        if pre.is_some_and(str::is_empty) {
            return Err(VersionParseError::EmptySegment(s.to_string()));
        }

        let mut segments = Vec::new();
        for segment in core.split('.') {
            if segment.is_empty() {
                return Err(VersionParseError::EmptySegment(s.to_string()));
            }
            let n = segment
                .bytes()
                .all(|b| b.is_ascii_digit())
                .then(|| segment.parse::<u64>().ok())
                .flatten()
                .ok_or_else(|| VersionParseError::NonNumeric {
                    version: s.to_string(),
                    segment: segment.to_string(),
                })?;
            segments.push(n);
        }

        Ok(Self {
            segments,
            pre: pre.map(str::to_string),
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn pre(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core: Vec<String> = self.segments.iter().map(|n| n.to_string()).collect();
        f.write_str(&core.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.segments.len().max(other.segments.len());
        let core = (0..width)
            .map(|i| {
                let a = self.segments.get(i).copied().unwrap_or(0);
                let b = other.segments.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.segments.len().cmp(&other.segments.len()));

        core.then_with(|| match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => compare_prerelease(a, b).then_with(|| a.cmp(b)),
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare pre-release tags identifier by identifier, numerically where both
/// sides are numeric (`rc.10` > `rc.9`).
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
        }
    }
}
