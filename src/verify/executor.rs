//! Download and verify one artifact through the tier chain

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use toolpin_store::{HashAlgorithm, PinnedDatabase, TrustTier};
use toolpin_version::{SpecKind, VersionSpec};
use url::Url;

use super::digest::{read_artifact, ArtifactDigests, DigestWriter};
use super::published::extract_published_digest;
use super::report::{OutcomeParts, VerificationOutcome};
use super::signature::{parse_public_key, parse_signature, verify_detached, SigningError};
use super::tier::{decide, AttemptResult, TierAttempt, TierDecision, TierProbe, VerificationPolicy};
use crate::error::ErrorKind;
use crate::http::HttpError;
use crate::registry::{Platform, PublicKeySource, RegistryError, ToolProvider, ToolRegistry};
use crate::retry::RetryError;
use crate::session::Session;

/// One artifact to fetch and verify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub tool: String,
    /// Exact version; partial and symbolic specs are resolved beforehand
    pub version: String,
    pub platform: Platform,
    /// Overrides the registry's URL for this tool
    pub artifact_url: Option<Url>,
    pub destination: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        tool: impl Into<String>,
        version: impl Into<String>,
        platform: Platform,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            platform,
            artifact_url: None,
            destination: destination.into(),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.artifact_url = Some(url);
        self
    }
}

/// Verification failures
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{tool}@{version}: {reason}")]
    InvalidRequest {
        tool: String,
        version: String,
        reason: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{tool}@{version} ({platform}): artifact download failed: {source}")]
    ArtifactUnreachable {
        tool: String,
        version: String,
        platform: Platform,
        #[source]
        source: RetryError<HttpError>,
    },

    #[error(
        "{tool}@{version} ({platform}): {tier} {algorithm} mismatch against {origin}: expected {expected}, got {actual}"
    )]
    DigestMismatch {
        tool: String,
        version: String,
        platform: Platform,
        tier: TrustTier,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
        origin: String,
    },

    #[error("{tool}@{version} ({platform}): signature rejected ({origin}): {reason}")]
    SignatureInvalid {
        tool: String,
        version: String,
        platform: Platform,
        reason: String,
        origin: String,
    },

    #[error(
        "{tool}@{version} ({platform}): no tier at least as strong as {minimum} could verify the artifact"
    )]
    InsufficientTrust {
        tool: String,
        version: String,
        platform: Platform,
        minimum: TrustTier,
        attempts: Vec<TierAttempt>,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerificationError::InvalidRequest { .. } | VerificationError::Registry(_) => {
                ErrorKind::InvalidSpec
            }
            VerificationError::ArtifactUnreachable { .. } => ErrorKind::Network,
            VerificationError::DigestMismatch { .. } | VerificationError::SignatureInvalid { .. } => {
                ErrorKind::DigestMismatch
            }
            VerificationError::InsufficientTrust { .. } => ErrorKind::InsufficientTrust,
            VerificationError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Tier that produced a fatal result, if any.
    pub fn tier(&self) -> Option<TrustTier> {
        match self {
            VerificationError::DigestMismatch { tier, .. } => Some(*tier),
            VerificationError::SignatureInvalid { .. } => Some(TrustTier::Signature),
            _ => None,
        }
    }
}

pub type VerifyResult<T> = Result<T, VerificationError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> VerificationError + '_ {
    move |source| VerificationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `<destination>.partial`, next to the destination
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

/// Removes the partial download unless it was promoted.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn promote(mut self, destination: &Path) -> io::Result<()> {
        fs::rename(&self.path, destination)?;
        self.keep = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial download");
                }
            }
        }
    }
}

/// Identity of the request being verified, for errors and logs
struct Subject<'r> {
    request: &'r DownloadRequest,
}

impl Subject<'_> {
    fn tool(&self) -> String {
        self.request.tool.clone()
    }

    fn version(&self) -> String {
        self.request.version.clone()
    }
}

/// Walks the tiers for each request
pub struct Verifier<'a> {
    registry: &'a ToolRegistry,
    pinned: Option<&'a PinnedDatabase>,
    pinned_fingerprint: Option<String>,
    policy: VerificationPolicy,
}

impl<'a> Verifier<'a> {
    pub fn new(registry: &'a ToolRegistry, policy: VerificationPolicy) -> Self {
        Self {
            registry,
            pinned: None,
            pinned_fingerprint: None,
            policy,
        }
    }

    pub fn with_pinned(mut self, db: &'a PinnedDatabase) -> Self {
        self.pinned_fingerprint = match db.fingerprint() {
            Ok(fp) => Some(fp),
            Err(e) => {
                tracing::warn!(error = %e, "could not fingerprint pinned database");
                None
            }
        };
        self.pinned = Some(db);
        self
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Download the artifact and accept it at the strongest applicable tier.
    ///
    /// Bytes land in `<destination>.partial` and are renamed into place only
    /// once a tier accepts them; on any failure the partial file is removed.
    pub fn verify_download(&self, session: &mut Session, request: &DownloadRequest) -> VerifyResult<VerificationOutcome> {
        let subject = Subject { request };
        let provider = self.registry.get(&request.tool)?;
        check_exact(request)?;

        let url = match &request.artifact_url {
            Some(url) => url.clone(),
            None => provider.artifact_url(&request.version, request.platform)?,
        };

        let span = tracing::info_span!(
            "verify",
            tool = %request.tool,
            version = %request.version,
            platform = %request.platform
        );
        let _enter = span.enter();

        if let Some(parent) = request.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let partial = PartialFile {
            path: partial_path(&request.destination),
            keep: false,
        };
        tracing::info!(url = %url, "downloading artifact");
        let (writer, bytes) = session
            .download(&format!("download {}", request.tool), &url, || {
                File::create(&partial.path).map(DigestWriter::new)
            })
            .map_err(|source| VerificationError::ArtifactUnreachable {
                tool: subject.tool(),
                version: subject.version(),
                platform: request.platform,
                source,
            })?;
        let (file, digests) = writer.finish();
        file.sync_all().map_err(io_error(&partial.path))?;
        drop(file);
        tracing::debug!(bytes, sha256 = %digests.sha256, "artifact downloaded");

        let mut attempts = Vec::new();
        let mut warnings = Vec::new();

        for tier in TrustTier::ALL {
            if !self.policy.allows(tier) {
                attempts.push(TierAttempt::skipped(tier, &self.policy));
                continue;
            }

            let probe = match tier {
                TrustTier::Signature => self.probe_signature(session, &subject, provider, &partial.path, &mut warnings)?,
                TrustTier::Pinned => self.probe_pinned(request, &digests, &mut warnings),
                TrustTier::Published => self.probe_published(session, &subject, provider, &digests, &mut warnings)?,
                TrustTier::Calculated => TierProbe::Verified {
                    algorithm: provider.default_algorithm(),
                    expected: None,
                    source: "calculated locally".to_string(),
                },
            };

            match (decide(&self.policy, tier, &probe), probe) {
                (
                    TierDecision::Accept,
                    TierProbe::Verified {
                        algorithm,
                        expected,
                        source,
                    },
                ) => {
                    attempts.push(TierAttempt::new(
                        tier,
                        AttemptResult::Accepted,
                        format!("verified against {}", source),
                    ));
                    partial
                        .promote(&request.destination)
                        .map_err(io_error(&request.destination))?;

                    let outcome = VerificationOutcome::new(OutcomeParts {
                        tool: request.tool.clone(),
                        version: request.version.clone(),
                        platform: request.platform,
                        artifact_url: url.to_string(),
                        path: request.destination.clone(),
                        tier,
                        minimum_tier: self.policy.minimum,
                        digest_source: source,
                        algorithm,
                        expected_digest: expected,
                        computed: digests,
                        attempts,
                        warnings,
                        pinned_db_fingerprint: self.pinned_fingerprint.clone(),
                    });

                    if outcome.is_degraded() {
                        tracing::warn!(digest = %outcome.digest, "accepted on trust on first use");
                    } else {
                        tracing::info!(tier = tier.number(), source = %outcome.digest_source, "artifact verified");
                    }
                    return Ok(outcome);
                }
                (TierDecision::Reject, probe) => {
                    tracing::error!(tier = tier.number(), detail = %probe.detail(), "verification rejected");
                    return Err(rejection(&subject, tier, probe));
                }
                (_, probe) => {
                    tracing::debug!(tier = tier.number(), detail = %probe.detail(), "tier not applicable");
                    attempts.push(TierAttempt::new(tier, AttemptResult::NotApplicable, probe.detail()));
                }
            }
        }

        tracing::error!(minimum = %self.policy.minimum, "no tier could verify the artifact");
        Err(VerificationError::InsufficientTrust {
            tool: subject.tool(),
            version: subject.version(),
            platform: request.platform,
            minimum: self.policy.minimum,
            attempts,
        })
    }

    fn probe_signature(
        &self,
        session: &mut Session,
        subject: &Subject<'_>,
        provider: &dyn ToolProvider,
        artifact: &Path,
        warnings: &mut Vec<String>,
    ) -> VerifyResult<TierProbe> {
        let request = subject.request;
        let Some(source) = provider.signature(&request.version, request.platform)? else {
            return Ok(TierProbe::not_applicable("no signature configured"));
        };
        let origin = source.signature_url.to_string();

        let sig_body = match session.fetch_optional("signature", &source.signature_url) {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(TierProbe::not_applicable(format!("no signature published at {}", origin))),
            Err(e) => return Ok(lookup_unavailable("signature", &source.signature_url, e, warnings)),
        };

        let key_text = match &source.public_key {
            PublicKeySource::Inline(key) => key.clone(),
            PublicKeySource::Url(url) => match session.fetch_optional("public key", url) {
                Ok(Some(body)) => String::from_utf8_lossy(&body).into_owned(),
                Ok(None) => return Ok(TierProbe::not_applicable(format!("no public key published at {}", url))),
                Err(e) => return Ok(lookup_unavailable("public key", url, e, warnings)),
            },
        };

        let bad = |e: SigningError| TierProbe::BadSignature {
            reason: e.to_string(),
            source: origin.clone(),
        };

        let signature = match parse_signature(&String::from_utf8_lossy(&sig_body)) {
            Ok(signature) => signature,
            Err(SigningError::Unsupported(reason)) => {
                let note = format!("signature at {} skipped: {}", origin, reason);
                tracing::warn!(url = %origin, %reason, "unsupported signature format");
                warnings.push(note.clone());
                return Ok(TierProbe::not_applicable(note));
            }
            Err(e) => return Ok(bad(e)),
        };
        let key = match parse_public_key(&key_text) {
            Ok(key) => key,
            Err(e) => return Ok(bad(e)),
        };

        let message = read_artifact(artifact).map_err(io_error(artifact))?;
        Ok(match verify_detached(&message, &signature, &key, source.key_fingerprint.as_deref()) {
            Ok(true) => TierProbe::Verified {
                algorithm: provider.default_algorithm(),
                expected: None,
                source: format!("signature {} (key {})", origin, key.fingerprint()),
            },
            Ok(false) => TierProbe::BadSignature {
                reason: "signature does not match the artifact".to_string(),
                source: origin,
            },
            Err(e) => bad(e),
        })
    }

    fn probe_pinned(&self, request: &DownloadRequest, digests: &ArtifactDigests, warnings: &mut Vec<String>) -> TierProbe {
        let Some(db) = self.pinned else {
            return TierProbe::not_applicable("no pinned database loaded");
        };
        let platform = request.platform.as_str();

        match db.get(&request.tool, &request.version, platform) {
            Some(record) => {
                let source = "pinned database".to_string();
                if digests.matches(record.algorithm, &record.digest) {
                    TierProbe::Verified {
                        algorithm: record.algorithm,
                        expected: Some(record.digest.clone()),
                        source,
                    }
                } else {
                    TierProbe::Mismatch {
                        algorithm: record.algorithm,
                        expected: record.digest.clone(),
                        actual: digests.get(record.algorithm).to_string(),
                        source,
                    }
                }
            }
            None => {
                let others: Vec<&str> = db
                    .platforms_for(&request.tool, &request.version)
                    .map(|r| r.platform.as_str())
                    .collect();
                if others.is_empty() {
                    return TierProbe::not_applicable("not pinned");
                }
                let note = format!(
                    "{}@{} is pinned for {} but not for {}",
                    request.tool,
                    request.version,
                    others.join(", "),
                    platform
                );
                tracing::warn!(pinned = ?others, %platform, "pinned entry is for another platform");
                warnings.push(note.clone());
                TierProbe::not_applicable(note)
            }
        }
    }

    fn probe_published(
        &self,
        session: &mut Session,
        subject: &Subject<'_>,
        provider: &dyn ToolProvider,
        digests: &ArtifactDigests,
        warnings: &mut Vec<String>,
    ) -> VerifyResult<TierProbe> {
        let request = subject.request;
        let Some(source) = provider.published_digest(&request.version, request.platform)? else {
            return Ok(TierProbe::not_applicable("publisher has no digest source"));
        };
        let origin = source.url().to_string();

        let body = match session.fetch_optional("published digest", source.url()) {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(TierProbe::not_applicable(format!("no digest published at {}", origin))),
            Err(e) => return Ok(lookup_unavailable("published digest", source.url(), e, warnings)),
        };

        let expected = match extract_published_digest(&source, &body) {
            Ok(expected) => expected,
            Err(e) => {
                tracing::warn!(url = %origin, error = %e, "publisher digest unusable");
                warnings.push(e.to_string());
                return Ok(TierProbe::not_applicable(e.to_string()));
            }
        };

        let algorithm = source.algorithm();
        Ok(if digests.matches(algorithm, &expected) {
            TierProbe::Verified {
                algorithm,
                expected: Some(expected),
                source: origin,
            }
        } else {
            TierProbe::Mismatch {
                algorithm,
                expected,
                actual: digests.get(algorithm).to_string(),
                source: origin,
            }
        })
    }
}

/// A lookup that failed after retries leaves its tier not applicable. The
/// warning lands in the report; enforcement decides whether the weaker tiers
/// that remain are good enough.
fn lookup_unavailable(what: &str, url: &Url, error: RetryError<HttpError>, warnings: &mut Vec<String>) -> TierProbe {
    let note = format!("{} lookup at {} failed: {}", what, url, error);
    tracing::warn!(%url, %error, "{} unavailable, tier not applicable", what);
    warnings.push(note.clone());
    TierProbe::not_applicable(note)
}

fn check_exact(request: &DownloadRequest) -> VerifyResult<()> {
    let invalid = |reason: String| VerificationError::InvalidRequest {
        tool: request.tool.clone(),
        version: request.version.clone(),
        reason,
    };
    let spec = VersionSpec::parse(&request.tool, &request.version).map_err(|e| invalid(e.to_string()))?;
    match spec.kind {
        SpecKind::Exact => Ok(()),
        _ => Err(invalid(format!(
            "'{}' is not an exact version; resolve it first",
            request.version
        ))),
    }
}

fn rejection(subject: &Subject<'_>, tier: TrustTier, probe: TierProbe) -> VerificationError {
    match probe {
        TierProbe::Mismatch {
            algorithm,
            expected,
            actual,
            source,
        } => VerificationError::DigestMismatch {
            tool: subject.tool(),
            version: subject.version(),
            platform: subject.request.platform,
            tier,
            algorithm,
            expected,
            actual,
            origin: source,
        },
        TierProbe::BadSignature { reason, source } => VerificationError::SignatureInvalid {
            tool: subject.tool(),
            version: subject.version(),
            platform: subject.request.platform,
            reason,
            origin: source,
        },
        other => VerificationError::InvalidRequest {
            tool: subject.tool(),
            version: subject.version(),
            reason: format!("{} rejected: {}", tier, other.detail()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttp;
    use crate::retry::{NoSleep, Retrier, RetryPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    fn session(mock: &Arc<MockHttp>) -> Session {
        let retrier = Retrier::new(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO)).with_sleeper(NoSleep);
        Session::new(mock.clone(), retrier, Duration::from_secs(60))
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/node.tar.xz")),
            PathBuf::from("/tmp/out/node.tar.xz.partial")
        );
    }

    #[test]
    fn test_rejects_non_exact_versions_without_requests() {
        let mock = Arc::new(MockHttp::new());
        let registry = ToolRegistry::builtin();
        let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
        let dir = tempfile::TempDir::new().unwrap();

        for version in ["22", "lts", "null"] {
            let request = DownloadRequest::new("node", version, Platform::Amd64, dir.path().join("node"));
            let err = verifier.verify_download(&mut session(&mock), &request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSpec, "{version}");
        }
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_tofu_when_nothing_else_applies() {
        let mock = Arc::new(MockHttp::new());
        let url = "https://www.python.org/ftp/python/3.12.7/Python-3.12.7.tar.xz";
        mock.respond(url, "python source");
        let registry = ToolRegistry::builtin();
        let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("python.tar.xz");

        let outcome = verifier
            .verify_download(&mut session(&mock), &DownloadRequest::new("python", "3.12.7", Platform::Amd64, &dest))
            .unwrap();
        assert_eq!(outcome.tier, TrustTier::Calculated);
        assert!(outcome.is_degraded());
        assert_eq!(fs::read(&dest).unwrap(), b"python source");
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_download_failure_leaves_nothing() {
        let mock = Arc::new(MockHttp::new());
        let registry = ToolRegistry::builtin();
        let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("python.tar.xz");

        let err = verifier
            .verify_download(&mut session(&mock), &DownloadRequest::new("python", "3.12.7", Platform::Amd64, &dest))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
