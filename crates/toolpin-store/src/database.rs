//! In-memory pinned database document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{StoreError, StoreResult};
use crate::record::{ChecksumKey, ChecksumRecord, HashAlgorithm};
use crate::SCHEMA_VERSION;

/// Document metadata (`metadata` object)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// When the document was last written by a maintenance run
    pub generated: DateTime<Utc>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The pinned checksum document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedDatabase {
    pub metadata: DatabaseMetadata,

    /// Records in insertion order
    #[serde(default)]
    pub checksums: Vec<ChecksumRecord>,
}

/// A single structural problem found by validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    UnsupportedSchema { found: u32 },
    EmptyField { index: usize, field: &'static str },
    InvalidDigest {
        key: ChecksumKey,
        algorithm: HashAlgorithm,
        digest: String,
    },
    DuplicateKey { key: ChecksumKey },
    GeneratedNotAdvanced {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::UnsupportedSchema { found } => {
                write!(f, "unsupported schema_version {} (expected {})", found, SCHEMA_VERSION)
            }
            StructuralError::EmptyField { index, field } => {
                write!(f, "checksums[{}]: empty '{}'", index, field)
            }
            StructuralError::InvalidDigest {
                key,
                algorithm,
                digest,
            } => write!(
                f,
                "{}: digest '{}' is not {} lowercase hex characters for {}",
                key,
                digest,
                algorithm.hex_len(),
                algorithm
            ),
            StructuralError::DuplicateKey { key } => write!(f, "{}: duplicate entry", key),
            StructuralError::GeneratedNotAdvanced { previous, current } => write!(
                f,
                "metadata.generated {} does not advance past {}",
                current.to_rfc3339(),
                previous.to_rfc3339()
            ),
        }
    }
}

impl PinnedDatabase {
    /// An empty document generated at `generated`.
    pub fn new(generated: DateTime<Utc>) -> Self {
        Self {
            metadata: DatabaseMetadata {
                schema_version: SCHEMA_VERSION,
                generated,
            },
            checksums: Vec::new(),
        }
    }

    /// An empty document dated at the Unix epoch, so any real update advances it.
    pub fn empty() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Look up a pinned entry.
    pub fn get(&self, tool: &str, version: &str, platform: &str) -> Option<&ChecksumRecord> {
        self.checksums
            .iter()
            .rev()
            .find(|r| r.matches_key(tool, version, platform))
    }

    /// All entries pinned for a tool version, on any platform.
    pub fn platforms_for<'a>(
        &'a self,
        tool: &'a str,
        version: &'a str,
    ) -> impl Iterator<Item = &'a ChecksumRecord> + 'a {
        self.checksums
            .iter()
            .filter(move |r| r.tool == tool && r.version == version)
    }

    /// Insert or replace an entry, keeping its position when it already
    /// exists. Returns the replaced record.
    pub fn upsert(&mut self, record: ChecksumRecord) -> Option<ChecksumRecord> {
        let position = self
            .checksums
            .iter()
            .position(|r| r.matches_key(&record.tool, &record.version, &record.platform));

        match position {
            Some(index) => Some(std::mem::replace(&mut self.checksums[index], record)),
            None => {
                self.checksums.push(record);
                None
            }
        }
    }

    /// Remove every entry for a tool, or for one version of it. Returns how
    /// many records were dropped.
    pub fn remove(&mut self, tool: &str, version: Option<&str>) -> usize {
        let before = self.checksums.len();
        self.checksums
            .retain(|r| !(r.tool == tool && version.map_or(true, |v| r.version == v)));
        before - self.checksums.len()
    }

    /// Distinct tool names, sorted.
    pub fn tools(&self) -> BTreeSet<&str> {
        self.checksums.iter().map(|r| r.tool.as_str()).collect()
    }

    /// Validate the document on its own.
    pub fn validate(&self) -> Result<(), Vec<StructuralError>> {
        let errors = self.structural_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate the document as a successor of `previous`: everything
    /// [`validate`](Self::validate) checks, plus `generated` must move forward.
    pub fn validate_against(&self, previous: Option<&PinnedDatabase>) -> Result<(), Vec<StructuralError>> {
        let mut errors = self.structural_errors();

        if let Some(previous) = previous {
            if self.metadata.generated <= previous.metadata.generated {
                errors.push(StructuralError::GeneratedNotAdvanced {
                    previous: previous.metadata.generated,
                    current: self.metadata.generated,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn structural_errors(&self) -> Vec<StructuralError> {
        let mut errors = Vec::new();

        if self.metadata.schema_version != SCHEMA_VERSION {
            errors.push(StructuralError::UnsupportedSchema {
                found: self.metadata.schema_version,
            });
        }

        let mut seen = HashSet::new();
        for (index, record) in self.checksums.iter().enumerate() {
            for (field, value) in [
                ("tool", &record.tool),
                ("version", &record.version),
                ("platform", &record.platform),
            ] {
                if value.trim().is_empty() {
                    errors.push(StructuralError::EmptyField { index, field });
                }
            }

            if !record.algorithm.is_valid_digest(&record.digest) {
                errors.push(StructuralError::InvalidDigest {
                    key: record.key(),
                    algorithm: record.algorithm,
                    digest: record.digest.clone(),
                });
            }

            if !seen.insert(record.key()) {
                errors.push(StructuralError::DuplicateKey { key: record.key() });
            }
        }

        errors
    }

    /// SHA-256 over the JCS form of the document. Recorded in verification
    /// reports so a result can be tied to the exact database state.
    pub fn fingerprint(&self) -> StoreResult<String> {
        let canonical = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| StoreError::Canonicalization(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TrustTier;
    use chrono::TimeZone;

    fn record(tool: &str, version: &str, platform: &str, digest: &str) -> ChecksumRecord {
        ChecksumRecord {
            tool: tool.to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
            algorithm: HashAlgorithm::Sha256,
            digest: digest.to_string(),
            captured_tier: TrustTier::Published,
            captured_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_get_and_upsert() {
        let mut db = PinnedDatabase::empty();
        assert!(db.get("k9s", "0.50.16", "amd64").is_none());

        assert!(db.upsert(record("k9s", "0.50.16", "amd64", &"a".repeat(64))).is_none());
        assert!(db.upsert(record("k9s", "0.50.16", "arm64", &"b".repeat(64))).is_none());

        let replaced = db.upsert(record("k9s", "0.50.16", "amd64", &"c".repeat(64)));
        assert_eq!(replaced.unwrap().digest, "a".repeat(64));

        assert_eq!(db.checksums.len(), 2);
        assert_eq!(db.checksums[0].digest, "c".repeat(64));
        assert_eq!(db.get("k9s", "0.50.16", "amd64").unwrap().digest, "c".repeat(64));
    }

    #[test]
    fn test_validate_detects_problems() {
        let mut db = PinnedDatabase::empty();
        db.checksums.push(record("k9s", "0.50.16", "amd64", &"a".repeat(64)));
        db.checksums.push(record("k9s", "0.50.16", "amd64", &"b".repeat(64)));
        db.checksums.push(record("node", "22.18.0", "amd64", "ABCDEF"));
        db.checksums.push(record("", "1.0.0", "amd64", &"d".repeat(64)));

        let errors = db.validate().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::DuplicateKey { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::InvalidDigest { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralError::EmptyField { field: "tool", .. })));
    }

    #[test]
    fn test_validate_against_requires_advance() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let previous = PinnedDatabase::new(at);
        let same = PinnedDatabase::new(at);
        let errors = same.validate_against(Some(&previous)).unwrap_err();
        assert!(matches!(errors[0], StructuralError::GeneratedNotAdvanced { .. }));

        let later = PinnedDatabase::new(at + chrono::Duration::seconds(1));
        assert!(later.validate_against(Some(&previous)).is_ok());
    }

    #[test]
    fn test_remove() {
        let mut db = PinnedDatabase::empty();
        db.upsert(record("k9s", "0.50.15", "amd64", &"a".repeat(64)));
        db.upsert(record("k9s", "0.50.16", "amd64", &"b".repeat(64)));
        db.upsert(record("node", "22.18.0", "amd64", &"c".repeat(64)));

        assert_eq!(db.remove("k9s", Some("0.50.15")), 1);
        assert_eq!(db.remove("k9s", None), 1);
        assert_eq!(db.tools().into_iter().collect::<Vec<_>>(), vec!["node"]);
    }

    #[test]
    fn test_fingerprint_stable() {
        let mut db = PinnedDatabase::empty();
        db.upsert(record("k9s", "0.50.16", "amd64", &"a".repeat(64)));
        let json = db.to_json().unwrap();
        let parsed = PinnedDatabase::from_json(&json).unwrap();
        assert_eq!(db.fingerprint().unwrap(), parsed.fingerprint().unwrap());
        assert_eq!(db.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn test_document_shape() {
        let mut db = PinnedDatabase::empty();
        db.upsert(record("k9s", "0.50.16", "amd64", &"a".repeat(64)));
        let value: serde_json::Value = serde_json::from_str(&db.to_json().unwrap()).unwrap();
        assert_eq!(value["metadata"]["schema_version"], 1);
        assert!(value["metadata"]["generated"].is_string());
        assert_eq!(value["checksums"][0]["tool"], "k9s");
        assert_eq!(value["checksums"][0]["algorithm"], "sha256");
        assert_eq!(value["checksums"][0]["captured_tier"], "published");
    }
}
