//! Manifest-driven batch runs
//!
//! A manifest lists the tools a build uses:
//!
//! ```toml
//! [[tool]]
//! name = "node"
//! version = "22"
//! platforms = ["amd64", "arm64"]
//! ```
//!
//! `verify` resolves and verifies every entry; `check` compares the resolved
//! versions against the pinned database. Entry failures never abort the run;
//! they are folded into the report's exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use toolpin_store::{PinnedDatabase, TrustTier};

use crate::error::{ErrorKind, ExitCode};
use crate::registry::{file_name, Platform, ToolRegistry};
use crate::resolver::Resolver;
use crate::session::Session;
use crate::verify::{DownloadRequest, VerificationPolicy, Verifier};

/// Schema version for batch reports
pub const BATCH_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for batch reports
pub const BATCH_SCHEMA_ID: &str = "toolpin/batch_report@1";

/// Tool manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default, rename = "tool")]
    pub tools: Vec<ManifestEntry>,
}

fn default_schema_version() -> u32 {
    1
}

/// One `[[tool]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,

    /// Version spec: exact, partial or a channel name
    pub version: String,

    /// Defaults to the host platform (amd64 on unsupported hosts)
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

impl ManifestEntry {
    pub fn platforms(&self) -> Vec<Platform> {
        if self.platforms.is_empty() {
            vec![Platform::host().unwrap_or(Platform::Amd64)]
        } else {
            self.platforms.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate tool '{0}' in manifest")]
    DuplicateTool(String),

    #[error("tool #{index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("manifest lists no tools")]
    Empty,
}

impl ManifestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManifestError::Io { .. } => ErrorKind::Io,
            _ => ErrorKind::InvalidSpec,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        // An unreadable manifest is invalid input too.
        ExitCode::InvalidInput
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.tools.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, entry) in self.tools.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(ManifestError::InvalidEntry {
                    index,
                    reason: "name must not be empty".to_string(),
                });
            }
            if entry.version.trim().is_empty() {
                return Err(ManifestError::InvalidEntry {
                    index,
                    reason: format!("{}: version must not be empty", entry.name),
                });
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ManifestError::DuplicateTool(entry.name.clone()));
            }
        }
        Ok(())
    }
}

/// Per-entry result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Verified at tiers 1-3
    Verified,
    /// Accepted on trust on first use
    Degraded,
    /// Pinned for the resolved version
    Current,
    /// Pinned, but only for other versions
    Outdated,
    /// Not pinned at all
    Missing,
    Failed,
}

impl EntryStatus {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            EntryStatus::Verified | EntryStatus::Degraded | EntryStatus::Current => ExitCode::Success,
            EntryStatus::Outdated | EntryStatus::Missing => ExitCode::Outdated,
            EntryStatus::Failed => ExitCode::VerificationFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub tool: String,
    pub spec: String,
    pub platform: Platform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub status: EntryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<TrustTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Versions currently pinned for this tool and platform (`check`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pinned_versions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    fn new(entry: &ManifestEntry, platform: Platform, status: EntryStatus) -> Self {
        Self {
            tool: entry.name.clone(),
            spec: entry.version.clone(),
            platform,
            version: None,
            status,
            tier: None,
            digest: None,
            path: None,
            pinned_versions: Vec::new(),
            warnings: Vec::new(),
            error_kind: None,
            error: None,
        }
    }

    fn failed(entry: &ManifestEntry, platform: Platform, kind: ErrorKind, error: impl ToString) -> Self {
        let mut out = Self::new(entry, platform, EntryStatus::Failed);
        out.error_kind = Some(kind);
        out.error = Some(error.to_string());
        out
    }

    /// Exit code contribution of this entry
    pub fn exit_code(&self) -> ExitCode {
        match self.error_kind {
            Some(kind) => kind.exit_code(),
            None => self.status.exit_code(),
        }
    }
}

/// Report for `batch` and `pins check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub command: String,
    pub entries: Vec<BatchEntry>,
    pub exit_code: i32,
}

impl BatchReport {
    fn new(command: &str, entries: Vec<BatchEntry>) -> Self {
        let exit_code = entries
            .iter()
            .fold(ExitCode::Success, |acc, e| acc.combine(e.exit_code()));
        Self {
            schema_version: BATCH_SCHEMA_VERSION,
            schema_id: BATCH_SCHEMA_ID.to_string(),
            run_id: ulid::Ulid::new().to_string().to_lowercase(),
            created_at: Utc::now(),
            command: command.to_string(),
            entries,
            exit_code: exit_code.as_i32(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from_i32(self.exit_code).unwrap_or(ExitCode::VerificationFailed)
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Resolve and verify every manifest entry into `output_dir`.
///
/// Artifacts land in `<output_dir>/<tool>/<version>/<platform>/<file>`.
pub fn verify_manifest(
    session: &mut Session,
    registry: &ToolRegistry,
    pinned: Option<&PinnedDatabase>,
    policy: VerificationPolicy,
    manifest: &Manifest,
    output_dir: &Path,
) -> BatchReport {
    let resolver = Resolver::new(registry);
    let mut verifier = Verifier::new(registry, policy);
    if let Some(db) = pinned {
        verifier = verifier.with_pinned(db);
    }

    let mut entries = Vec::new();
    for entry in &manifest.tools {
        let resolved = resolver.resolve_version(session, &entry.name, &entry.version);

        for platform in entry.platforms() {
            let version = match &resolved {
                Ok(resolved) => resolved.version.clone(),
                Err(e) => {
                    entries.push(BatchEntry::failed(entry, platform, e.kind(), e));
                    continue;
                }
            };

            let url = match registry
                .get(&entry.name)
                .and_then(|p| p.artifact_url(&version, platform))
            {
                Ok(url) => url,
                Err(e) => {
                    entries.push(BatchEntry::failed(entry, platform, ErrorKind::InvalidSpec, e));
                    continue;
                }
            };
            let artifact_name = file_name(&url).unwrap_or_else(|| entry.name.clone());
            let destination = output_dir
                .join(&entry.name)
                .join(&version)
                .join(platform.as_str())
                .join(artifact_name);

            let request = DownloadRequest::new(&entry.name, &version, platform, destination).with_url(url);
            let mut out = match verifier.verify_download(session, &request) {
                Ok(outcome) => {
                    let status = if outcome.is_degraded() {
                        EntryStatus::Degraded
                    } else {
                        EntryStatus::Verified
                    };
                    let mut out = BatchEntry::new(entry, platform, status);
                    out.tier = Some(outcome.tier);
                    out.digest = Some(outcome.digest);
                    out.path = Some(outcome.path);
                    out.warnings = outcome.warnings;
                    out
                }
                Err(e) => BatchEntry::failed(entry, platform, e.kind(), &e),
            };
            out.version = Some(version);
            entries.push(out);
        }
    }

    let report = BatchReport::new("verify", entries);
    tracing::info!(
        entries = report.entries.len(),
        verified = report.count(EntryStatus::Verified),
        degraded = report.count(EntryStatus::Degraded),
        failed = report.count(EntryStatus::Failed),
        "batch verify finished"
    );
    report
}

/// Compare resolved versions against the pinned database. Nothing is
/// downloaded.
pub fn check_manifest(
    session: &mut Session,
    registry: &ToolRegistry,
    pinned: &PinnedDatabase,
    manifest: &Manifest,
) -> BatchReport {
    let resolver = Resolver::new(registry);
    let mut entries = Vec::new();

    for entry in &manifest.tools {
        let resolved = resolver.resolve_version(session, &entry.name, &entry.version);

        for platform in entry.platforms() {
            let version = match &resolved {
                Ok(resolved) => resolved.version.clone(),
                Err(e) => {
                    entries.push(BatchEntry::failed(entry, platform, e.kind(), e));
                    continue;
                }
            };

            let pinned_versions: Vec<String> = pinned
                .checksums
                .iter()
                .filter(|r| r.tool == entry.name && r.platform == platform.as_str())
                .map(|r| r.version.clone())
                .collect();

            let status = match pinned.get(&entry.name, &version, platform.as_str()) {
                Some(_) => EntryStatus::Current,
                None if pinned_versions.is_empty() => EntryStatus::Missing,
                None => EntryStatus::Outdated,
            };
            if status != EntryStatus::Current {
                tracing::warn!(tool = %entry.name, %version, %platform, ?status, "pinned database lags");
            }

            let mut out = BatchEntry::new(entry, platform, status);
            out.version = Some(version);
            out.pinned_versions = pinned_versions;
            entries.push(out);
        }
    }

    BatchReport::new("check", entries)
}
