//! toolpin - version resolution and tiered checksum verification
//!
//! Resolves loose version specs (`22`, `3.12`, `stable`) for the tools a
//! container build installs, downloads the artifacts and verifies them against
//! the strongest available source of truth: a publisher signature, a pinned
//! checksum, a publisher digest, or as a last resort a locally computed one.

pub mod agent;
pub mod batch;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod verify;

pub use agent::{AgentOptions, AgentReport, AutoUpdateAgent, PinAction};
pub use batch::{BatchReport, EntryStatus, Manifest, ManifestEntry};
pub use config::{EffectiveConfig, Settings};
pub use error::{ErrorKind, ExitCode};
pub use registry::{Platform, ToolProvider, ToolRegistry};
pub use resolver::{ResolveError, Resolver};
pub use retry::{RetryPolicy, Retrier};
pub use session::Session;
pub use verify::{DownloadRequest, VerificationError, VerificationOutcome, VerificationPolicy, Verifier};

pub use toolpin_store::{ChecksumRecord, HashAlgorithm, PinnedDatabase, PinnedStore, TrustTier};
pub use toolpin_version::{matches, ResolvedVersion, VersionSpec};
