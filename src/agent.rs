//! Auto-update agent
//!
//! Re-derives digests for the versions a manifest currently resolves to and
//! writes them into the pinned database through the store's update protocol.
//! Digests are derived at the strongest tier available other than the pinned
//! database itself. An existing pin that disagrees with a fresh derivation is
//! a conflict and is left untouched unless re-pinning is allowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use toolpin_store::{ChecksumRecord, PinnedDatabase, PinnedStore, StoreError, TrustTier, UpdateSummary};

use crate::batch::{Manifest, ManifestEntry};
use crate::error::{ErrorKind, ExitCode};
use crate::registry::{Platform, ToolRegistry};
use crate::resolver::Resolver;
use crate::session::Session;
use crate::verify::{DownloadRequest, VerificationOutcome, VerificationPolicy, Verifier};

/// Schema version for agent reports
pub const AGENT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for agent reports
pub const AGENT_SCHEMA_ID: &str = "toolpin/agent_report@1";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("work directory {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Store(e) if e.is_corrupt() => ErrorKind::StoreCorrupt,
            AgentError::Store(_) | AgentError::WorkDir { .. } => ErrorKind::Io,
        }
    }
}

/// Agent switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// Replace pins whose digest no longer matches
    pub allow_repin: bool,
    /// Accept tier 4 digests as pins
    pub allow_calculated: bool,
    /// Report only, do not write the store
    pub dry_run: bool,
}

/// What happened to one `(tool, version, platform)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinAction {
    Added,
    Unchanged,
    Repinned,
    /// Fresh digest differs from the pin; pin kept
    Conflict,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub tool: String,
    pub spec: String,
    pub platform: Platform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub action: PinAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<TrustTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentEntry {
    fn new(entry: &ManifestEntry, platform: Platform, action: PinAction) -> Self {
        Self {
            tool: entry.name.clone(),
            spec: entry.version.clone(),
            platform,
            version: None,
            action,
            tier: None,
            digest: None,
            previous_digest: None,
            error_kind: None,
            error: None,
        }
    }

    fn failed(entry: &ManifestEntry, platform: Platform, kind: ErrorKind, error: impl ToString) -> Self {
        let mut out = Self::new(entry, platform, PinAction::Failed);
        out.error_kind = Some(kind);
        out.error = Some(error.to_string());
        out
    }

    pub fn exit_code(&self) -> ExitCode {
        match (self.action, self.error_kind) {
            (_, Some(kind)) => kind.exit_code(),
            (PinAction::Conflict, None) => ExitCode::VerificationFailed,
            _ => ExitCode::Success,
        }
    }
}

/// Store write performed by the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreWrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub generated: DateTime<Utc>,
    pub records: usize,
    pub pruned_backups: usize,
}

impl From<UpdateSummary> for StoreWrite {
    fn from(summary: UpdateSummary) -> Self {
        Self {
            backup: summary.backup,
            generated: summary.generated,
            records: summary.records,
            pruned_backups: summary.pruned_backups,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub dry_run: bool,
    pub entries: Vec<AgentEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_write: Option<StoreWrite>,
}

impl AgentReport {
    pub fn exit_code(&self) -> ExitCode {
        self.entries
            .iter()
            .fold(ExitCode::Success, |acc, e| acc.combine(e.exit_code()))
    }

    pub fn count(&self, action: PinAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Keeps the pinned database in step with the manifest
pub struct AutoUpdateAgent<'a> {
    registry: &'a ToolRegistry,
    store: &'a PinnedStore,
    options: AgentOptions,
    work_dir: PathBuf,
}

impl<'a> AutoUpdateAgent<'a> {
    pub fn new(registry: &'a ToolRegistry, store: &'a PinnedStore, options: AgentOptions) -> Self {
        let work_dir = std::env::temp_dir().join(format!(
            "toolpin-agent-{}",
            ulid::Ulid::new().to_string().to_lowercase()
        ));
        Self {
            registry,
            store,
            options,
            work_dir,
        }
    }

    /// Download scratch space; removed after each run.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    fn policy(&self) -> VerificationPolicy {
        if self.options.allow_calculated {
            VerificationPolicy::permissive()
        } else {
            VerificationPolicy::require_verified()
        }
    }

    pub fn run(&self, session: &mut Session, manifest: &Manifest) -> Result<AgentReport, AgentError> {
        let current = self.store.load_or_empty()?;
        fs::create_dir_all(&self.work_dir).map_err(|source| AgentError::WorkDir {
            path: self.work_dir.clone(),
            source,
        })?;

        let result = self.derive_all(session, manifest, &current);

        if let Err(e) = fs::remove_dir_all(&self.work_dir) {
            tracing::warn!(path = %self.work_dir.display(), error = %e, "failed to clean agent work directory");
        }

        let (entries, records) = result;
        let store_write = if records.is_empty() || self.options.dry_run {
            None
        } else {
            let summary = self.store.update(|db| {
                for record in records {
                    db.upsert(record);
                }
            })?;
            tracing::info!(
                path = %self.store.path().display(),
                records = summary.records,
                backup = ?summary.backup,
                "pinned database updated"
            );
            Some(StoreWrite::from(summary))
        };

        Ok(AgentReport {
            schema_version: AGENT_SCHEMA_VERSION,
            schema_id: AGENT_SCHEMA_ID.to_string(),
            run_id: ulid::Ulid::new().to_string().to_lowercase(),
            created_at: Utc::now(),
            dry_run: self.options.dry_run,
            entries,
            store_write,
        })
    }

    fn derive_all(
        &self,
        session: &mut Session,
        manifest: &Manifest,
        current: &PinnedDatabase,
    ) -> (Vec<AgentEntry>, Vec<ChecksumRecord>) {
        let resolver = Resolver::new(self.registry);
        // No pinned database: pins are derived from tiers 1, 3 and 4 only.
        let verifier = Verifier::new(self.registry, self.policy());

        let mut entries = Vec::new();
        let mut records = Vec::new();

        for entry in &manifest.tools {
            let resolved = resolver.resolve_version(session, &entry.name, &entry.version);

            for platform in entry.platforms() {
                let version = match &resolved {
                    Ok(resolved) => resolved.version.clone(),
                    Err(e) => {
                        entries.push(AgentEntry::failed(entry, platform, e.kind(), e));
                        continue;
                    }
                };

                let destination = self
                    .work_dir
                    .join(format!("{}-{}-{}", entry.name, version, platform.as_str()));
                let request = DownloadRequest::new(&entry.name, &version, platform, &destination);

                let mut out = match verifier.verify_download(session, &request) {
                    Ok(outcome) => {
                        if let Err(e) = fs::remove_file(&destination) {
                            tracing::debug!(path = %destination.display(), error = %e, "scratch artifact not removed");
                        }
                        let (out, record) = self.reconcile(entry, current, &outcome);
                        records.extend(record);
                        out
                    }
                    Err(e) => AgentEntry::failed(entry, platform, e.kind(), &e),
                };
                out.version = Some(version);
                entries.push(out);
            }
        }

        (entries, records)
    }

    /// Compare a fresh outcome with the existing pin.
    fn reconcile(
        &self,
        entry: &ManifestEntry,
        current: &PinnedDatabase,
        outcome: &VerificationOutcome,
    ) -> (AgentEntry, Option<ChecksumRecord>) {
        let platform = outcome.platform;
        let record = ChecksumRecord {
            tool: outcome.tool.clone(),
            version: outcome.version.clone(),
            platform: platform.as_str().to_string(),
            algorithm: outcome.algorithm,
            digest: outcome.digest.to_ascii_lowercase(),
            captured_tier: outcome.tier,
            captured_at: outcome.created_at,
        };

        let existing = current.get(&record.tool, &record.version, &record.platform);
        let action = match existing {
            None => PinAction::Added,
            Some(pin) if pin.algorithm == record.algorithm && pin.digest.eq_ignore_ascii_case(&record.digest) => {
                PinAction::Unchanged
            }
            Some(_) if self.options.allow_repin => PinAction::Repinned,
            Some(_) => PinAction::Conflict,
        };

        let mut out = AgentEntry::new(entry, platform, action);
        out.tier = Some(outcome.tier);
        out.digest = Some(record.digest.clone());
        out.previous_digest = existing.map(|p| p.digest.clone());

        match action {
            PinAction::Added | PinAction::Repinned => {
                tracing::info!(tool = %record.tool, version = %record.version, %platform, ?action, tier = outcome.tier.number(), "pin derived");
                (out, Some(record))
            }
            PinAction::Conflict => {
                tracing::error!(
                    tool = %record.tool,
                    version = %record.version,
                    %platform,
                    pinned = ?out.previous_digest,
                    derived = %record.digest,
                    "derived digest contradicts pinned entry; keeping pin"
                );
                (out, None)
            }
            _ => (out, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ManifestEntry {
        ManifestEntry {
            name: "k9s".to_string(),
            version: "0.50.16".to_string(),
            platforms: vec![Platform::Amd64],
        }
    }

    #[test]
    fn test_entry_exit_codes() {
        assert_eq!(
            AgentEntry::new(&entry(), Platform::Amd64, PinAction::Added).exit_code(),
            ExitCode::Success
        );
        assert_eq!(
            AgentEntry::new(&entry(), Platform::Amd64, PinAction::Conflict).exit_code(),
            ExitCode::VerificationFailed
        );
        assert_eq!(
            AgentEntry::failed(&entry(), Platform::Amd64, ErrorKind::InvalidSpec, "bad").exit_code(),
            ExitCode::InvalidInput
        );
    }

    #[test]
    fn test_policy_follows_allow_calculated() {
        let registry = ToolRegistry::builtin();
        let store = PinnedStore::new("/nonexistent/checksums.json");
        let strict = AutoUpdateAgent::new(&registry, &store, AgentOptions::default());
        assert_eq!(strict.policy(), VerificationPolicy::require_verified());

        let lax = AutoUpdateAgent::new(
            &registry,
            &store,
            AgentOptions {
                allow_calculated: true,
                ..AgentOptions::default()
            },
        );
        assert_eq!(lax.policy(), VerificationPolicy::permissive());
    }
}
