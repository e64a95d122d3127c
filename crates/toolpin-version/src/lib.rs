//! Version spec parsing, matching and release selection.
//!
//! Everything in this crate is pure: no I/O, no logging. The caller supplies
//! the release candidates (usually from an upstream feed) and gets back either
//! one concrete version or a typed reason why none could be chosen.

mod select;
mod spec;
mod version;

pub use select::{
    rank, select, ReleaseCandidate, ReleaseChannel, ResolutionMethod, ResolvedVersion,
    SelectError, Selection, SkippedCandidate,
};
pub use spec::{Channel, SpecError, SpecKind, VersionSpec, ALLOWED_SPEC_CHARS, SENTINELS};
pub use version::{Version, VersionParseError};

/// Check whether a partial version matches a concrete candidate.
///
/// `candidate` matches `partial` iff it is equal to it or continues it after a
/// `.` separator, so `"21"` matches `"21.0.3"` but never `"210.0.0"`.
pub fn matches(partial: &str, candidate: &str) -> bool {
    candidate == partial
        || candidate
            .strip_prefix(partial)
            .is_some_and(|rest| rest.starts_with('.'))
}
