//! Error taxonomy and stable exit codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification shared by every failure the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Structurally invalid input: bad spec, unknown tool, unusable version
    InvalidSpec,
    /// Upstream unreachable after the retry budget
    Network,
    /// No release satisfies the spec
    NoMatch,
    /// A signature or digest contradicted the artifact
    DigestMismatch,
    /// No allowed tier could vouch for the artifact
    InsufficientTrust,
    /// The pinned database is unreadable or invalid
    StoreCorrupt,
    /// Local filesystem failure
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSpec => "invalid_spec",
            ErrorKind::Network => "network",
            ErrorKind::NoMatch => "no_match",
            ErrorKind::DigestMismatch => "digest_mismatch",
            ErrorKind::InsufficientTrust => "insufficient_trust",
            ErrorKind::StoreCorrupt => "store_corrupt",
            ErrorKind::Io => "io",
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network)
    }

    /// Stable exit code for this kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ErrorKind::InvalidSpec | ErrorKind::StoreCorrupt => ExitCode::InvalidInput,
            ErrorKind::Network
            | ErrorKind::NoMatch
            | ErrorKind::DigestMismatch
            | ErrorKind::InsufficientTrust
            | ErrorKind::Io => ExitCode::VerificationFailed,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Everything resolved and verified
    Success = 0,
    /// Bad spec, manifest, config or pinned database
    InvalidInput = 2,
    /// Verification or resolution failed
    VerificationFailed = 10,
    /// Pinned entries lag the resolved versions
    Outdated = 11,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            2 => Some(ExitCode::InvalidInput),
            10 => Some(ExitCode::VerificationFailed),
            11 => Some(ExitCode::Outdated),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Precedence when several outcomes are folded into one code: invalid
    /// input beats verification failure beats outdated beats success.
    fn rank(&self) -> u8 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Outdated => 1,
            ExitCode::VerificationFailed => 2,
            ExitCode::InvalidInput => 3,
        }
    }

    /// The more severe of two codes.
    pub fn combine(self, other: ExitCode) -> ExitCode {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}
