//! Verification outcome record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use toolpin_store::{HashAlgorithm, TrustTier};

use super::digest::ArtifactDigests;
use super::tier::TierAttempt;
use crate::registry::Platform;

/// Schema version for verification reports
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for verification reports
pub const REPORT_SCHEMA_ID: &str = "toolpin/verification@1";

/// Attached to every tier 4 outcome
pub const TOFU_WARNING: &str = "checksum calculated locally without external verification \
(trust on first use); pin this digest or configure a signature to verify future downloads";

/// Result of a successful verified download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,

    pub tool: String,
    pub version: String,
    pub platform: Platform,
    pub artifact_url: String,
    pub path: PathBuf,

    /// Tier that accepted the artifact
    pub tier: TrustTier,
    pub minimum_tier: TrustTier,

    /// Where the accepting reference came from
    pub digest_source: String,

    pub algorithm: HashAlgorithm,

    /// Digest of the downloaded bytes under `algorithm`
    pub digest: String,

    /// Reference digest, when the accepting tier had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<String>,

    /// True when an external reference (tiers 1-3) confirmed the artifact
    pub digest_match: bool,

    pub computed: ArtifactDigests,

    #[serde(default)]
    pub attempts: Vec<TierAttempt>,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_db_fingerprint: Option<String>,
}

/// Fields gathered by the executor before the outcome is sealed
#[derive(Debug, Clone)]
pub struct OutcomeParts {
    pub tool: String,
    pub version: String,
    pub platform: Platform,
    pub artifact_url: String,
    pub path: PathBuf,
    pub tier: TrustTier,
    pub minimum_tier: TrustTier,
    pub digest_source: String,
    pub algorithm: HashAlgorithm,
    pub expected_digest: Option<String>,
    pub computed: ArtifactDigests,
    pub attempts: Vec<TierAttempt>,
    pub warnings: Vec<String>,
    pub pinned_db_fingerprint: Option<String>,
}

impl VerificationOutcome {
    pub fn new(parts: OutcomeParts) -> Self {
        let mut warnings = parts.warnings;
        if parts.tier == TrustTier::Calculated && !warnings.iter().any(|w| w == TOFU_WARNING) {
            warnings.insert(0, TOFU_WARNING.to_string());
        }

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            run_id: ulid::Ulid::new().to_string().to_lowercase(),
            created_at: Utc::now(),
            digest: parts.computed.get(parts.algorithm).to_string(),
            digest_match: parts.tier != TrustTier::Calculated,
            tool: parts.tool,
            version: parts.version,
            platform: parts.platform,
            artifact_url: parts.artifact_url,
            path: parts.path,
            tier: parts.tier,
            minimum_tier: parts.minimum_tier,
            digest_source: parts.digest_source,
            algorithm: parts.algorithm,
            expected_digest: parts.expected_digest,
            computed: parts.computed,
            attempts: parts.attempts,
            warnings,
            pinned_db_fingerprint: parts.pinned_db_fingerprint,
        }
    }

    /// Accepted on trust-on-first-use only.
    pub fn is_degraded(&self) -> bool {
        self.tier == TrustTier::Calculated
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))?;
        fs::write(path, json)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}
