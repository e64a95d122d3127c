//! Built-in tool providers

use toolpin_store::HashAlgorithm;
use url::Url;

use super::{
    append_to_file_name, build_url, check_version, DigestSource, Platform, RegistryResult,
    ToolProvider,
};
use crate::feed::{
    go_tag, static_url, EndOfLifeFeed, FeedClient, GitHubReleasesFeed, GoDownloadFeed, NodeIndexFeed,
    GO_INDEX_URL,
};

/// Node.js from nodejs.org; digests from the release's `SHASUMS256.txt`.
#[derive(Debug, Default)]
pub struct NodeProvider {
    feed: NodeIndexFeed,
}

impl NodeProvider {
    fn file_name(version: &str, platform: Platform) -> String {
        format!("node-v{}-linux-{}.tar.xz", version, platform.node_arch())
    }
}

impl ToolProvider for NodeProvider {
    fn id(&self) -> &str {
        "node"
    }

    fn description(&self) -> &str {
        "Node.js runtime (nodejs.org)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        build_url(
            self.id(),
            "https://nodejs.org/dist/",
            &[&format!("v{}", version), &Self::file_name(version, platform)],
        )
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        check_version(self.id(), version)?;
        let url = build_url(
            self.id(),
            "https://nodejs.org/dist/",
            &[&format!("v{}", version), "SHASUMS256.txt"],
        )?;
        Ok(Some(DigestSource::ChecksumList {
            url,
            file_name: Self::file_name(version, platform),
            algorithm: HashAlgorithm::Sha256,
        }))
    }
}

/// Go toolchain from dl.google.com; digests from the go.dev JSON index.
#[derive(Debug, Default)]
pub struct GoProvider {
    feed: GoDownloadFeed,
}

impl GoProvider {
    fn file_name(version: &str, platform: Platform) -> String {
        format!("{}.linux-{}.tar.gz", go_tag(version), platform.as_str())
    }
}

impl ToolProvider for GoProvider {
    fn id(&self) -> &str {
        "go"
    }

    fn description(&self) -> &str {
        "Go toolchain (go.dev)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        build_url(
            self.id(),
            "https://dl.google.com/go/",
            &[&Self::file_name(version, platform)],
        )
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        check_version(self.id(), version)?;
        Ok(Some(DigestSource::GoIndex {
            url: static_url(GO_INDEX_URL),
            file_name: Self::file_name(version, platform),
        }))
    }
}

/// CPython source release from python.org. python.org publishes no plain
/// digest files, so verification relies on the pinned database.
#[derive(Debug)]
pub struct PythonProvider {
    feed: EndOfLifeFeed,
}

impl Default for PythonProvider {
    fn default() -> Self {
        Self {
            feed: EndOfLifeFeed::new("python"),
        }
    }
}

impl ToolProvider for PythonProvider {
    fn id(&self) -> &str {
        "python"
    }

    fn description(&self) -> &str {
        "CPython source tarball (python.org)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, _platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        // 3.14.0-rc1 lives in 3.14.0/ as Python-3.14.0rc1.tar.xz
        let (directory, file_version) = match version.split_once('-') {
            Some((core, pre)) => (core.to_string(), format!("{}{}", core, pre)),
            None => (version.to_string(), version.to_string()),
        };
        build_url(
            self.id(),
            "https://www.python.org/ftp/python/",
            &[&directory, &format!("Python-{}.tar.xz", file_version)],
        )
    }
}

/// Rust toolchain from static.rust-lang.org; digest in `<artifact>.sha256`.
#[derive(Debug)]
pub struct RustProvider {
    feed: GitHubReleasesFeed,
}

impl Default for RustProvider {
    fn default() -> Self {
        Self {
            feed: GitHubReleasesFeed::new("rust-lang", "rust"),
        }
    }
}

impl ToolProvider for RustProvider {
    fn id(&self) -> &str {
        "rust"
    }

    fn description(&self) -> &str {
        "Rust toolchain (static.rust-lang.org)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        build_url(
            self.id(),
            "https://static.rust-lang.org/dist/",
            &[&format!(
                "rust-{}-{}-unknown-linux-gnu.tar.xz",
                version,
                platform.gnu_arch()
            )],
        )
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        let artifact = self.artifact_url(version, platform)?;
        Ok(Some(DigestSource::SingleDigest {
            url: append_to_file_name(self.id(), &artifact, ".sha256")?,
            algorithm: HashAlgorithm::Sha256,
        }))
    }
}

/// kubectl binary from dl.k8s.io; digest in `kubectl.sha256`.
#[derive(Debug)]
pub struct KubectlProvider {
    feed: GitHubReleasesFeed,
}

impl Default for KubectlProvider {
    fn default() -> Self {
        Self {
            feed: GitHubReleasesFeed::new("kubernetes", "kubernetes"),
        }
    }
}

impl ToolProvider for KubectlProvider {
    fn id(&self) -> &str {
        "kubectl"
    }

    fn description(&self) -> &str {
        "Kubernetes CLI (dl.k8s.io)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        build_url(
            self.id(),
            "https://dl.k8s.io/release/",
            &[
                &format!("v{}", version),
                "bin",
                "linux",
                platform.as_str(),
                "kubectl",
            ],
        )
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        let artifact = self.artifact_url(version, platform)?;
        Ok(Some(DigestSource::SingleDigest {
            url: append_to_file_name(self.id(), &artifact, ".sha256")?,
            algorithm: HashAlgorithm::Sha256,
        }))
    }
}

/// k9s release assets from GitHub; digests in the release's `checksums.sha256`.
#[derive(Debug)]
pub struct K9sProvider {
    feed: GitHubReleasesFeed,
}

impl Default for K9sProvider {
    fn default() -> Self {
        Self {
            feed: GitHubReleasesFeed::new("derailed", "k9s"),
        }
    }
}

impl K9sProvider {
    const RELEASES: &'static str = "https://github.com/derailed/k9s/releases/download/";

    fn file_name(platform: Platform) -> String {
        format!("k9s_Linux_{}.tar.gz", platform.as_str())
    }
}

impl ToolProvider for K9sProvider {
    fn id(&self) -> &str {
        "k9s"
    }

    fn description(&self) -> &str {
        "Kubernetes terminal UI (github.com/derailed/k9s)"
    }

    fn feed(&self) -> Option<&dyn FeedClient> {
        Some(&self.feed)
    }

    fn artifact_url(&self, version: &str, platform: Platform) -> RegistryResult<Url> {
        check_version(self.id(), version)?;
        build_url(
            self.id(),
            Self::RELEASES,
            &[&format!("v{}", version), &Self::file_name(platform)],
        )
    }

    fn published_digest(&self, version: &str, platform: Platform) -> RegistryResult<Option<DigestSource>> {
        check_version(self.id(), version)?;
        let url = build_url(
            self.id(),
            Self::RELEASES,
            &[&format!("v{}", version), "checksums.sha256"],
        )?;
        Ok(Some(DigestSource::ChecksumList {
            url,
            file_name: Self::file_name(platform),
            algorithm: HashAlgorithm::Sha256,
        }))
    }
}
