//! Checksum records and the trust tier vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Integrity tier, strongest first.
///
/// Ordering follows strength: `Signature < Pinned < Published < Calculated`,
/// so "at least as strong as X" is `tier <= X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// Tier 1: publisher signature over the artifact
    Signature,
    /// Tier 2: digest from the pinned database
    Pinned,
    /// Tier 3: digest published by the upstream project
    Published,
    /// Tier 4: locally calculated digest, trust on first use
    Calculated,
}

impl TrustTier {
    /// All tiers in evaluation order.
    pub const ALL: [TrustTier; 4] = [
        TrustTier::Signature,
        TrustTier::Pinned,
        TrustTier::Published,
        TrustTier::Calculated,
    ];

    /// Tier number as used in logs and reports (1-4).
    pub fn number(&self) -> u8 {
        match self {
            TrustTier::Signature => 1,
            TrustTier::Pinned => 2,
            TrustTier::Published => 3,
            TrustTier::Calculated => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Signature => "signature",
            TrustTier::Pinned => "pinned",
            TrustTier::Published => "published",
            TrustTier::Calculated => "calculated",
        }
    }

    /// Whether this tier is at least as strong as `minimum`.
    pub fn satisfies(&self, minimum: TrustTier) -> bool {
        *self <= minimum
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {} ({})", self.number(), self.as_str())
    }
}

impl FromStr for TrustTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "signature" => Ok(TrustTier::Signature),
            "2" | "pinned" => Ok(TrustTier::Pinned),
            // production mode: anything but trust on first use
            "3" | "published" | "pinned-or-better" | "verified" => Ok(TrustTier::Published),
            "4" | "calculated" | "tofu" => Ok(TrustTier::Calculated),
            other => Err(format!("unknown trust tier '{}'", other)),
        }
    }
}

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Length of a lowercase hex digest for this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Guess the algorithm from a hex digest's length.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Check a digest against the fixed-length lowercase hex pattern.
    pub fn is_valid_digest(&self, digest: &str) -> bool {
        digest.len() == self.hex_len()
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Hash a byte slice, returning lowercase hex.
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!("unsupported hash algorithm '{}'", other)),
        }
    }
}

/// Lookup key of a pinned entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChecksumKey {
    pub tool: String,
    pub version: String,
    pub platform: String,
}

impl ChecksumKey {
    pub fn new(tool: impl Into<String>, version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for ChecksumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.tool, self.version, self.platform)
    }
}

/// One pinned digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub tool: String,

    /// Exact version, never a partial or channel name
    pub version: String,

    /// Target architecture (`amd64`, `arm64`)
    pub platform: String,

    pub algorithm: HashAlgorithm,

    /// Lowercase hex digest
    pub digest: String,

    /// Tier the digest was derived from when it was captured
    pub captured_tier: TrustTier,

    pub captured_at: DateTime<Utc>,
}

impl ChecksumRecord {
    pub fn key(&self) -> ChecksumKey {
        ChecksumKey::new(&self.tool, &self.version, &self.platform)
    }

    pub fn matches_key(&self, tool: &str, version: &str, platform: &str) -> bool {
        self.tool == tool && self.version == version && self.platform == platform
    }
}
