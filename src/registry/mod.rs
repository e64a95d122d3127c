//! Tool registry
//!
//! Maps a tool identifier to a [`ToolProvider`] that knows the tool's release
//! feed, how to build its download URL, and where its publisher keeps
//! signatures and digests. Call sites never branch on tool names.

mod builtin;
mod platform;

pub use builtin::{GoProvider, K9sProvider, KubectlProvider, NodeProvider, PythonProvider, RustProvider};
pub use platform::Platform;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use toolpin_store::HashAlgorithm;
use url::Url;

use crate::feed::FeedClient;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown tool '{tool}' (known: {})", known.join(", "))]
    UnknownTool { tool: String, known: Vec<String> },

    #[error("{tool}: '{version}' cannot be used in a download URL")]
    InvalidVersion { tool: String, version: String },

    #[error("{tool}: cannot build URL: {reason}")]
    Url { tool: String, reason: String },

    #[error("{tool}: invalid configuration: {reason}")]
    InvalidOverride { tool: String, reason: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Where a publisher keeps the digest of an artifact (tier 3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestSource {
    /// `sha256sum`-style listing; the line for `file_name` is used
    ChecksumList {
        url: Url,
        file_name: String,
        algorithm: HashAlgorithm,
    },

    /// File holding one digest, optionally followed by a file name
    SingleDigest { url: Url, algorithm: HashAlgorithm },

    /// go.dev JSON download index
    GoIndex { url: Url, file_name: String },
}

impl DigestSource {
    pub fn url(&self) -> &Url {
        match self {
            DigestSource::ChecksumList { url, .. }
            | DigestSource::SingleDigest { url, .. }
            | DigestSource::GoIndex { url, .. } => url,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            DigestSource::ChecksumList { algorithm, .. } | DigestSource::SingleDigest { algorithm, .. } => {
                *algorithm
            }
            DigestSource::GoIndex { .. } => HashAlgorithm::Sha256,
        }
    }
}

/// Publisher public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeySource {
    Inline(String),
    Url(Url),
}

/// Detached signature of an artifact (tier 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSource {
    pub signature_url: Url,
    pub public_key: PublicKeySource,
    /// Expected SHA-256 fingerprint of the raw public key
    pub key_fingerprint: Option<String>,
}

fn default_signature_suffix() -> String {
    ".sig".to_string()
}

/// Signature source declared in configuration for a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Appended to the artifact file name to locate the signature
    #[serde(default = "default_signature_suffix")]
    pub suffix: String,

    /// Base64 (raw or minisign) public key
    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default)]
    pub public_key_url: Option<String>,

    #[serde(default)]
    pub key_fingerprint: Option<String>,
}

impl SignatureConfig {
    pub fn source_for(&self, tool: &str, artifact: &Url) -> RegistryResult<SignatureSource> {
        let public_key = match (&self.public_key, &self.public_key_url) {
            (Some(key), _) => PublicKeySource::Inline(key.clone()),
            (None, Some(url)) => PublicKeySource::Url(Url::parse(url).map_err(|e| {
                RegistryError::InvalidOverride {
                    tool: tool.to_string(),
                    reason: format!("public_key_url: {}", e),
                }
            })?),
            (None, None) => {
                return Err(RegistryError::InvalidOverride {
                    tool: tool.to_string(),
                    reason: "signature needs public_key or public_key_url".to_string(),
                })
            }
        };

        Ok(SignatureSource {
            signature_url: append_to_file_name(tool, artifact, &self.suffix)?,
            public_key,
            key_fingerprint: self.key_fingerprint.clone(),
        })
    }
}

/// Per-tool configuration (`[tools.<id>]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOverride {
    /// Download artifacts from this mirror instead of the upstream host.
    /// Publisher digests are still fetched upstream.
    #[serde(default)]
    pub mirror: Option<String>,

    #[serde(default)]
    pub signature: Option<SignatureConfig>,
}

/// Everything the engine needs to know about one tool
pub trait ToolProvider: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Release feed, if the tool has one. Tools without a feed only accept
    /// exact versions.
    fn feed(&self) -> Option<&dyn FeedClient>;

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url>;

    fn signature(&self, _version: &str, _platform: Platform) -> RegistryResult<Option<SignatureSource>> {
        Ok(None)
    }

    fn published_digest(&self, _version: &str, _platform: Platform) -> RegistryResult<Option<DigestSource>> {
        Ok(None)
    }

    /// Algorithm used for pinned records of this tool
    fn default_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
}

/// A provider with configuration layered on top
struct Configured {
    inner: Arc<dyn ToolProvider>,
    mirror: Option<Url>,
    signature: Option<SignatureConfig>,
}

impl ToolProvider for Configured {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        self.inner.feed()
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        let upstream = self.inner.artifact_url(version, platform)?;
        match &self.mirror {
            Some(mirror) => rebase(self.id(), &upstream, mirror),
            None => Ok(upstream),
        }
    }

    fn signature(&self, version: &str, platform: Platform) -> RegistryResult<Option<SignatureSource>> {
        match &self.signature {
            Some(config) => {
                let upstream = self.inner.artifact_url(version, platform)?;
                config.source_for(self.id(), &upstream).map(Some)
            }
            None => self.inner.signature(version, platform),
        }
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        self.inner.published_digest(version, platform)
    }

    fn default_algorithm(&self) -> HashAlgorithm {
        self.inner.default_algorithm()
    }
}

/// Tool identifier → provider
#[derive(Clone, Default)]
pub struct ToolRegistry {
    providers: BTreeMap<String, Arc<dyn ToolProvider>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NodeProvider::default()));
        registry.register(Arc::new(GoProvider::default()));
        registry.register(Arc::new(PythonProvider::default()));
        registry.register(Arc::new(RustProvider::default()));
        registry.register(Arc::new(KubectlProvider::default()));
        registry.register(Arc::new(K9sProvider::default()));
        registry
    }

    /// Add or replace a provider.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) -> Option<Arc<dyn ToolProvider>> {
        self.providers.insert(provider.id().to_string(), provider)
    }

    /// Layer `[tools.<id>]` configuration onto a registered provider.
    pub fn configure(&mut self, tool: &str, config: &ToolOverride) -> RegistryResult<()> {
        let inner = Arc::clone(self.lookup(tool)?);
        if config.mirror.is_none() && config.signature.is_none() {
            return Ok(());
        }

        let mirror = match &config.mirror {
            Some(m) => Some(parse_mirror(tool, m)?),
            None => None,
        };

        tracing::debug!(tool, mirror = ?config.mirror, signature = config.signature.is_some(), "tool configured");
        self.providers.insert(
            tool.to_string(),
            Arc::new(Configured {
                inner,
                mirror,
                signature: config.signature.clone(),
            }),
        );
        Ok(())
    }

    fn lookup(&self, tool: &str) -> RegistryResult<&Arc<dyn ToolProvider>> {
        self.providers.get(tool).ok_or_else(|| RegistryError::UnknownTool {
            tool: tool.to_string(),
            known: self.providers.keys().cloned().collect(),
        })
    }

    pub fn get(&self, tool: &str) -> RegistryResult<&dyn ToolProvider> {
        self.lookup(tool).map(|p| p.as_ref())
    }

    pub fn contains(&self, tool: &str) -> bool {
        self.providers.contains_key(tool)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn ToolProvider> {
        self.providers.values().map(|p| p.as_ref())
    }
}

/// Reject version strings that cannot safely become a path segment.
pub fn check_version(tool: &str, version: &str) -> RegistryResult<()> {
    let ok = !version.is_empty()
        && version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !version.starts_with(['.', '-'])
        && !version.contains("..");
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidVersion {
            tool: tool.to_string(),
            version: version.to_string(),
        })
    }
}

/// `base` with `segments` appended as percent-encoded path segments.
pub fn build_url(tool: &str, base: &str, segments: &[&str]) -> RegistryResult<Url> {
    let url_error = |reason: String| RegistryError::Url {
        tool: tool.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| url_error(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| url_error(format!("{} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `https://h/a/file.tar.gz` + `.sha256` → `https://h/a/file.tar.gz.sha256`
pub fn append_to_file_name(tool: &str, url: &Url, suffix: &str) -> RegistryResult<Url> {
    let file_name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RegistryError::Url {
            tool: tool.to_string(),
            reason: format!("{} has no file name", url),
        })?;

    let mut out = url.clone();
    out.path_segments_mut()
        .map_err(|_| RegistryError::Url {
            tool: tool.to_string(),
            reason: format!("{} cannot take a path", url),
        })?
        .pop()
        .push(&format!("{}{}", file_name, suffix));
    Ok(out)
}

/// Last path segment of a URL, used as the local file name.
pub fn file_name(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_mirror(tool: &str, mirror: &str) -> RegistryResult<Url> {
    let with_slash = if mirror.ends_with('/') {
        mirror.to_string()
    } else {
        format!("{}/", mirror)
    };
    let url = Url::parse(&with_slash).map_err(|e| RegistryError::InvalidOverride {
        tool: tool.to_string(),
        reason: format!("mirror {}: {}", mirror, e),
    })?;
    if url.cannot_be_a_base() {
        return Err(RegistryError::InvalidOverride {
            tool: tool.to_string(),
            reason: format!("mirror {} is not a base URL", mirror),
        });
    }
    Ok(url)
}

/// Move `upstream`'s path under `mirror`.
fn rebase(tool: &str, upstream: &Url, mirror: &Url) -> RegistryResult<Url> {
    mirror
        .join(upstream.path().trim_start_matches('/'))
        .map_err(|e| RegistryError::Url {
            tool: tool.to_string(),
            reason: format!("rebasing {} onto {}: {}", upstream, mirror, e),
        })
}
